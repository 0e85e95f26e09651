use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use db::models::citation::{Citation, CreateCitation, UpdateCitation};
use services::services::nap;
use tracing::{info, instrument};
use uuid::Uuid;

use super::locations::load_location;
use crate::{AppState, auth::RequestContext, error::ApiError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/locations/{location_id}/citations",
            get(list_citations).post(create_citation),
        )
        .route(
            "/locations/{location_id}/citations/check",
            post(check_citations),
        )
        .route(
            "/citations/{citation_id}",
            patch(update_citation).delete(delete_citation),
        )
}

#[instrument(name = "citations.list", skip(state, ctx), fields(user_id = %ctx.user_id, location_id = %location_id))]
async fn list_citations(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Vec<Citation>>, ApiError> {
    load_location(&state, ctx.user_id, location_id).await?;
    let citations = Citation::find_for_location(&state.db().pool, ctx.user_id, location_id).await?;
    Ok(Json(citations))
}

#[instrument(
    name = "citations.create",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, location_id = %location_id, directory = %payload.directory)
)]
async fn create_citation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Json(payload): Json<CreateCitation>,
) -> Result<(StatusCode, Json<Citation>), ApiError> {
    if payload.directory.trim().is_empty() {
        return Err(ApiError::BadRequest("directory is required".into()));
    }
    load_location(&state, ctx.user_id, location_id).await?;

    let citation =
        Citation::create(&state.db().pool, ctx.user_id, location_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(citation)))
}

#[instrument(
    name = "citations.update",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, citation_id = %citation_id)
)]
async fn update_citation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(citation_id): Path<Uuid>,
    Json(payload): Json<UpdateCitation>,
) -> Result<Json<Citation>, ApiError> {
    Citation::update(&state.db().pool, ctx.user_id, citation_id, &payload)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("citation"))
}

#[instrument(name = "citations.delete", skip(state, ctx), fields(user_id = %ctx.user_id, citation_id = %citation_id))]
async fn delete_citation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(citation_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if Citation::delete(&state.db().pool, ctx.user_id, citation_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("citation"))
    }
}

/// Compare every citation of the location against its current NAP and
/// store the outcome on each citation.
#[instrument(name = "citations.check", skip(state, ctx), fields(user_id = %ctx.user_id, location_id = %location_id))]
async fn check_citations(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Vec<Citation>>, ApiError> {
    let location = load_location(&state, ctx.user_id, location_id).await?;
    let pool = &state.db().pool;
    let citations = Citation::find_for_location(pool, ctx.user_id, location_id).await?;

    let mut checked = Vec::with_capacity(citations.len());
    for citation in &citations {
        let report = nap::check(&location, citation);
        checked.push(Citation::record_check(pool, citation.id, report.status, &report.mismatched).await?);
    }
    info!(count = checked.len(), "Checked citations");
    Ok(Json(checked))
}
