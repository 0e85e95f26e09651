use axum::{
    Router,
    http::{Request, header::HeaderName},
    middleware,
    routing::get,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, field};

use crate::{AppState, auth::require_session};

pub mod accounts;
pub mod ai;
pub mod citations;
pub mod dashboard;
pub mod health;
pub mod insights;
pub mod locations;
pub mod media;
pub mod oauth;
pub mod posts;
pub mod rankings;
pub mod reviews;
pub mod sync;

pub fn router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            let request_id = request
                .extensions()
                .get::<RequestId>()
                .and_then(|id| id.header_value().to_str().ok());
            let span = tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = field::Empty
            );
            if let Some(request_id) = request_id {
                span.record("request_id", field::display(request_id));
            }
            span
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO))
        .on_failure(DefaultOnFailure::new().level(Level::ERROR));

    let public = Router::<AppState>::new().route("/health", get(health::health_check));

    let protected = Router::<AppState>::new()
        .merge(dashboard::router())
        .merge(accounts::router())
        .merge(oauth::router())
        .merge(locations::router())
        .merge(reviews::router())
        .merge(posts::router())
        .merge(media::router())
        .merge(citations::router())
        .merge(rankings::router())
        .merge(insights::router())
        .merge(sync::router())
        .merge(ai::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    let storage = ServeDir::new(state.storage().root());

    Router::<AppState>::new()
        .nest("/api", public.merge(protected))
        .nest_service("/storage", storage)
        .layer(CorsLayer::permissive())
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            MakeRequestUuid {},
        ))
        .with_state(state)
}
