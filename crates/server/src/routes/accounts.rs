use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::get,
};
use db::models::{
    account::{CreateGoogleAccount, GoogleAccount, UpdateGoogleAccount},
    credential::GoogleCredential,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{AppState, auth::RequestContext, error::ApiError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts).post(create_account))
        .route(
            "/accounts/{account_id}",
            get(get_account).patch(update_account).delete(delete_account),
        )
}

#[instrument(name = "accounts.list", skip(state, ctx), fields(user_id = %ctx.user_id))]
async fn list_accounts(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Vec<GoogleAccount>>, ApiError> {
    let accounts = GoogleAccount::find_all(&state.db().pool, ctx.user_id).await?;
    Ok(Json(accounts))
}

#[instrument(
    name = "accounts.create",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, google_name = %payload.google_name)
)]
async fn create_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateGoogleAccount>,
) -> Result<(StatusCode, Json<GoogleAccount>), ApiError> {
    if !payload.google_name.starts_with("accounts/") {
        return Err(ApiError::BadRequest(
            "google_name must look like `accounts/{id}`".into(),
        ));
    }
    if payload.account_name.trim().is_empty() {
        return Err(ApiError::BadRequest("account_name is required".into()));
    }
    if let Some(credential_id) = payload.credential_id {
        ensure_credential(&state, ctx.user_id, credential_id).await?;
    }

    let account = GoogleAccount::create(&state.db().pool, ctx.user_id, &payload)
        .await
        .map_err(|e| ApiError::conflict_on_unique(e, "account is already linked"))?;
    Ok((StatusCode::CREATED, Json(account)))
}

#[instrument(name = "accounts.get", skip(state, ctx), fields(user_id = %ctx.user_id, account_id = %account_id))]
async fn get_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<GoogleAccount>, ApiError> {
    let account = load_account(&state, ctx.user_id, account_id).await?;
    Ok(Json(account))
}

#[instrument(
    name = "accounts.update",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, account_id = %account_id)
)]
async fn update_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<UpdateGoogleAccount>,
) -> Result<Json<GoogleAccount>, ApiError> {
    if payload
        .account_name
        .as_deref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(ApiError::BadRequest("account_name cannot be empty".into()));
    }
    if let Some(credential_id) = payload.credential_id {
        ensure_credential(&state, ctx.user_id, credential_id).await?;
    }

    GoogleAccount::update(&state.db().pool, ctx.user_id, account_id, &payload)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("account"))
}

#[instrument(name = "accounts.delete", skip(state, ctx), fields(user_id = %ctx.user_id, account_id = %account_id))]
async fn delete_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(account_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if GoogleAccount::soft_delete(&state.db().pool, ctx.user_id, account_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("account"))
    }
}

pub(crate) async fn load_account(
    state: &AppState,
    user_id: Uuid,
    account_id: Uuid,
) -> Result<GoogleAccount, ApiError> {
    GoogleAccount::find_by_id(&state.db().pool, user_id, account_id)
        .await?
        .ok_or(ApiError::NotFound("account"))
}

async fn ensure_credential(
    state: &AppState,
    user_id: Uuid,
    credential_id: Uuid,
) -> Result<(), ApiError> {
    GoogleCredential::find_by_id(&state.db().pool, user_id, credential_id)
        .await?
        .map(|_| ())
        .ok_or(ApiError::BadRequest(format!(
            "credential {credential_id} does not exist"
        )))
}
