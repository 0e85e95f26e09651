use std::sync::OnceLock;

use sentry_tracing::{EventFilter, SentryLayer};
use tracing::Level;

static INIT_GUARD: OnceLock<Option<sentry::ClientInitGuard>> = OnceLock::new();

fn environment() -> &'static str {
    if cfg!(debug_assertions) {
        "dev"
    } else {
        "production"
    }
}

/// Initialise Sentry once. Reporting is only active when a DSN is supplied;
/// without one the tracing layer stays installed but sends nothing.
pub fn init_once(dsn: Option<&str>) -> bool {
    INIT_GUARD
        .get_or_init(|| {
            let dsn = dsn.map(str::trim).filter(|d| !d.is_empty())?;
            let guard = sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    environment: Some(environment().into()),
                    ..Default::default()
                },
            ));
            sentry::configure_scope(|scope| {
                scope.set_tag("source", "backend");
            });
            Some(guard)
        })
        .is_some()
}

/// Attach the authenticated user to subsequent Sentry events on this scope.
pub fn configure_user_scope(user_id: &str, email: Option<&str>) {
    let sentry_user = sentry::User {
        id: Some(user_id.to_string()),
        email: email.map(str::to_string),
        ..Default::default()
    };

    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry_user));
    });
}

pub fn sentry_layer<S>() -> SentryLayer<S>
where
    S: tracing::Subscriber,
    S: for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    SentryLayer::default()
        .span_filter(|meta| {
            matches!(
                *meta.level(),
                Level::DEBUG | Level::INFO | Level::WARN | Level::ERROR
            )
        })
        .event_filter(|meta| match *meta.level() {
            Level::ERROR => EventFilter::Event,
            Level::DEBUG | Level::INFO | Level::WARN => EventFilter::Breadcrumb,
            Level::TRACE => EventFilter::Ignore,
        })
}
