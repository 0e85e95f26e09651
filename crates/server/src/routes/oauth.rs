//! Linking a user's Google identity through the authorization code flow.
//!
//! `authorize` hands the browser a consent URL whose `state` is a short
//! lived token signed for the calling user. Google redirects the browser
//! back to the frontend, which forwards `code` and `state` to `callback`
//! with its session token; the state must belong to that same user.

use axum::{
    Json, Router,
    extract::{Extension, Query, State},
    routing::get,
};
use db::models::{
    credential::{CredentialSummary, GoogleCredential},
    sync_job::SyncJob,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use services::services::google::auth::GoogleOAuthClient;
use tracing::{info, instrument, warn};
use ts_rs::TS;

use crate::{AppState, auth::RequestContext, error::ApiError};

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct AuthorizeResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct CallbackResponse {
    pub credential: CredentialSummary,
    /// Account discovery run right after linking; absent when it failed.
    pub sync_job: Option<SyncJob>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/google/authorize", get(authorize))
        .route("/oauth/google/callback", get(callback))
        .route("/oauth/google/credentials", get(list_credentials))
}

fn oauth_client(state: &AppState) -> Result<&GoogleOAuthClient, ApiError> {
    state
        .sync()
        .tokens()
        .oauth()
        .ok_or_else(|| ApiError::Unavailable("Google OAuth is not configured".into()))
}

#[instrument(name = "oauth.authorize", skip(state, ctx), fields(user_id = %ctx.user_id))]
async fn authorize(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let client = oauth_client(&state)?;
    let state_token = state
        .jwt()
        .issue_oauth_state(ctx.user_id)
        .map_err(|e| ApiError::Internal(format!("failed to sign oauth state: {e}")))?;
    let url = client.authorize_url(&state_token)?;
    Ok(Json(AuthorizeResponse {
        url: url.to_string(),
    }))
}

#[instrument(name = "oauth.callback", skip(state, ctx, query), fields(user_id = %ctx.user_id))]
async fn callback(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>, ApiError> {
    if let Some(error) = query.error {
        return Err(ApiError::BadRequest(format!("Google denied consent: {error}")));
    }
    let (Some(code), Some(state_token)) = (query.code, query.state) else {
        return Err(ApiError::BadRequest("code and state are required".into()));
    };

    let state_user = state
        .jwt()
        .verify_oauth_state(&state_token)
        .map_err(|_| ApiError::BadRequest("invalid or expired oauth state".into()))?;
    if state_user != ctx.user_id {
        return Err(ApiError::BadRequest(
            "oauth state was issued to a different user".into(),
        ));
    }

    let client = oauth_client(&state)?;
    let grant = client.exchange_code(&code).await?;
    let Some(refresh_token) = grant.refresh_token.as_ref() else {
        return Err(ApiError::BadRequest(
            "Google did not return a refresh token; revoke access and consent again".into(),
        ));
    };

    let credential = GoogleCredential::upsert(
        &state.db().pool,
        ctx.user_id,
        grant.email.as_deref(),
        refresh_token.expose_secret(),
        &grant.scope,
    )
    .await?;
    state.sync().tokens().forget(credential.id).await;
    info!(credential_id = %credential.id, "Linked Google credential");

    let sync_job = match state
        .sync()
        .sync_accounts(ctx.user_id, Some(credential.id))
        .await
    {
        Ok(job) => Some(job),
        Err(error) => {
            warn!(%error, credential_id = %credential.id, "Account discovery after linking failed");
            None
        }
    };

    Ok(Json(CallbackResponse {
        credential: CredentialSummary::from(&credential),
        sync_job,
    }))
}

#[instrument(name = "oauth.credentials", skip(state, ctx), fields(user_id = %ctx.user_id))]
async fn list_credentials(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Vec<CredentialSummary>>, ApiError> {
    let credentials = GoogleCredential::find_all(&state.db().pool, ctx.user_id).await?;
    Ok(Json(credentials.iter().map(CredentialSummary::from).collect()))
}
