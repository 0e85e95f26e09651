//! On-demand sync runs and the job history they leave behind.
//!
//! A run completes before the response is sent; the returned job carries
//! the outcome, including partial failures of a full sync.

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    routing::{get, post},
};
use db::models::sync_job::SyncJob;
use serde::Deserialize;
use services::services::gmb_sync::{AccountSyncScope, LocationSyncScope};
use tracing::instrument;
use uuid::Uuid;

use super::{accounts::load_account, locations::load_location};
use crate::{AppState, auth::RequestContext, error::ApiError};

const DEFAULT_JOB_LIMIT: i64 = 20;
const MAX_JOB_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
struct DiscoverQuery {
    credential_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct AccountScopeQuery {
    #[serde(default)]
    scope: AccountSyncScope,
}

#[derive(Debug, Deserialize)]
struct LocationScopeQuery {
    #[serde(default)]
    scope: LocationSyncScope,
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    limit: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync/accounts", post(discover_accounts))
        .route("/sync/accounts/{account_id}", post(sync_account))
        .route("/sync/locations/{location_id}", post(sync_location))
        .route("/sync/jobs", get(list_jobs))
        .route("/sync/jobs/{job_id}", get(get_job))
}

#[instrument(name = "sync.accounts", skip(state, ctx, query), fields(user_id = %ctx.user_id))]
async fn discover_accounts(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<DiscoverQuery>,
) -> Result<Json<SyncJob>, ApiError> {
    let job = state
        .sync()
        .sync_accounts(ctx.user_id, query.credential_id)
        .await?;
    Ok(Json(job))
}

#[instrument(
    name = "sync.account",
    skip(state, ctx, query),
    fields(user_id = %ctx.user_id, account_id = %account_id, scope = ?query.scope)
)]
async fn sync_account(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(account_id): Path<Uuid>,
    Query(query): Query<AccountScopeQuery>,
) -> Result<Json<SyncJob>, ApiError> {
    let account = load_account(&state, ctx.user_id, account_id).await?;
    let job = match query.scope {
        AccountSyncScope::Locations => state.sync().sync_locations(ctx.user_id, &account).await?,
        AccountSyncScope::Full => state.sync().sync_full(ctx.user_id, &account).await?,
    };
    Ok(Json(job))
}

#[instrument(
    name = "sync.location",
    skip(state, ctx, query),
    fields(user_id = %ctx.user_id, location_id = %location_id, scope = ?query.scope)
)]
async fn sync_location(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Query(query): Query<LocationScopeQuery>,
) -> Result<Json<SyncJob>, ApiError> {
    let location = load_location(&state, ctx.user_id, location_id).await?;
    let job = state
        .sync()
        .sync_location(ctx.user_id, &location, query.scope)
        .await?;
    Ok(Json(job))
}

#[instrument(name = "sync.jobs", skip(state, ctx, query), fields(user_id = %ctx.user_id))]
async fn list_jobs(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<Vec<SyncJob>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_JOB_LIMIT)
        .clamp(1, MAX_JOB_LIMIT);
    let jobs = SyncJob::find_recent(&state.db().pool, ctx.user_id, limit).await?;
    Ok(Json(jobs))
}

#[instrument(name = "sync.job", skip(state, ctx), fields(user_id = %ctx.user_id, job_id = %job_id))]
async fn get_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<SyncJob>, ApiError> {
    SyncJob::find_by_id(&state.db().pool, ctx.user_id, job_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("sync job"))
}
