use std::{sync::Arc, time::Duration};

use anyhow::Context;
use db::DBService;
use server::{AppState, auth::JwtService, file_logging, routes};
use services::services::{
    ai::AiService,
    config::AppConfig,
    gmb_sync::{GmbSyncService, TokenResolver},
    google::{
        GoogleClient, TokenSource,
        auth::{
            CachedTokenSource, GoogleOAuthClient, ServiceAccountKey, ServiceAccountTokenSource,
            http_client,
        },
    },
    storage::StorageService,
};
use utils::{assets::asset_dir, build_info::BUILD_INFO};

const OAUTH_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Held for the life of the process so buffered file logs get flushed.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let _file_log_guard = file_logging::init_logging(&log_level);

    let config = AppConfig::from_env().context("invalid configuration")?;
    if utils::sentry::init_once(config.sentry_dsn.as_deref()) {
        tracing::info!("Sentry error reporting enabled");
    }

    tracing::info!(
        build = %BUILD_INFO.describe(),
        branch = BUILD_INFO.git_branch,
        "Starting gbp-hub"
    );

    if !asset_dir().exists() {
        std::fs::create_dir_all(asset_dir())?;
    }

    let db = DBService::new().await.context("failed to open database")?;
    let jwt = JwtService::new(&config.auth_jwt_secret).context("invalid AUTH_JWT_SECRET")?;

    let tokens = Arc::new(build_token_resolver(&config)?);
    let google = Arc::new(GoogleClient::new().context("failed to build Google client")?);
    let sync = Arc::new(GmbSyncService::new(db.clone(), google, tokens));
    let ai = AiService::from_config(&config.ai).context("failed to build AI client")?;
    let storage = StorageService::from_config(&config.storage);

    tracing::info!(
        ai_providers = ?ai.provider_names(),
        storage_root = %storage.root().display(),
        "Services ready"
    );

    if let Err(e) = sync.close_abandoned_jobs().await {
        tracing::error!("Failed to close interrupted sync jobs: {}", e);
    }
    let sync_handle = config
        .sync_interval
        .map(|interval| Arc::clone(&sync).spawn_periodic(interval));
    if sync_handle.is_none() {
        tracing::info!("Background sync disabled");
    }

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(db.clone(), config, jwt, sync, ai, storage);
    let app_router = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server running on http://{}", listener.local_addr()?);

    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sync_handle {
        handle.abort();
    }
    perform_cleanup_actions(&db).await;

    Ok(())
}

/// Service account when a key file is configured, OAuth client when the
/// client id/secret/redirect are all set. Either may be absent.
fn build_token_resolver(config: &AppConfig) -> anyhow::Result<TokenResolver> {
    let service_account = match &config.google.service_account_file {
        Some(path) => {
            let key = ServiceAccountKey::from_file(path)
                .with_context(|| format!("failed to read service account key {}", path.display()))?;
            tracing::info!(client_email = %key.client_email, "Using Google service account");
            let http = http_client(OAUTH_HTTP_TIMEOUT)?;
            let source: Arc<dyn TokenSource> = Arc::new(ServiceAccountTokenSource::new(http, key)?);
            Some(Arc::new(CachedTokenSource::new(source)) as Arc<dyn TokenSource>)
        }
        None => {
            tracing::info!("No Google service account configured");
            None
        }
    };

    let oauth = match &config.google.oauth {
        Some(oauth) => Some(GoogleOAuthClient::new(
            http_client(OAUTH_HTTP_TIMEOUT)?,
            &oauth.client_id,
            oauth.client_secret.clone(),
            &oauth.redirect_uri,
        )),
        None => {
            tracing::info!("Google OAuth linking disabled");
            None
        }
    };

    Ok(TokenResolver::new(service_account, oauth))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let terminate = async {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
            } else {
                tracing::error!("Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}

/// Flush the WAL into the main database file and close the pool.
pub async fn perform_cleanup_actions(db: &DBService) {
    tracing::info!("Running final WAL checkpoint...");
    match sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(&db.pool)
        .await
    {
        Ok(_) => tracing::info!("Final WAL checkpoint completed"),
        Err(e) => tracing::warn!("Final WAL checkpoint failed: {}", e),
    }

    db.pool.close().await;
    tracing::info!("Database connection pool closed");
}
