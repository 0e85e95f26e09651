use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::get,
};
use db::models::location::{CreateLocation, Location, UpdateLocation};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use super::accounts::load_account;
use crate::{AppState, auth::RequestContext, error::ApiError};

#[derive(Debug, Deserialize)]
struct LocationsQuery {
    account_id: Option<Uuid>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/locations", get(list_locations).post(create_location))
        .route(
            "/locations/{location_id}",
            get(get_location)
                .patch(update_location)
                .delete(delete_location),
        )
}

#[instrument(name = "locations.list", skip(state, ctx, query), fields(user_id = %ctx.user_id))]
async fn list_locations(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<LocationsQuery>,
) -> Result<Json<Vec<Location>>, ApiError> {
    let locations = Location::find_all(&state.db().pool, ctx.user_id, query.account_id).await?;
    Ok(Json(locations))
}

#[instrument(
    name = "locations.create",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, title = %payload.title)
)]
async fn create_location(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateLocation>,
) -> Result<(StatusCode, Json<Location>), ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".into()));
    }
    if let Some(account_id) = payload.account_id {
        load_account(&state, ctx.user_id, account_id).await?;
    }

    let location = Location::create(&state.db().pool, ctx.user_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(location)))
}

#[instrument(name = "locations.get", skip(state, ctx), fields(user_id = %ctx.user_id, location_id = %location_id))]
async fn get_location(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Location>, ApiError> {
    let location = load_location(&state, ctx.user_id, location_id).await?;
    Ok(Json(location))
}

#[instrument(
    name = "locations.update",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, location_id = %location_id)
)]
async fn update_location(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Json(payload): Json<UpdateLocation>,
) -> Result<Json<Location>, ApiError> {
    if payload
        .title
        .as_deref()
        .is_some_and(|title| title.trim().is_empty())
    {
        return Err(ApiError::BadRequest("title cannot be empty".into()));
    }

    Location::update(&state.db().pool, ctx.user_id, location_id, &payload)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("location"))
}

#[instrument(name = "locations.delete", skip(state, ctx), fields(user_id = %ctx.user_id, location_id = %location_id))]
async fn delete_location(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if Location::soft_delete(&state.db().pool, ctx.user_id, location_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("location"))
    }
}

/// Fetch a location owned by `user_id`, or 404.
pub(crate) async fn load_location(
    state: &AppState,
    user_id: Uuid,
    location_id: Uuid,
) -> Result<Location, ApiError> {
    Location::find_by_id(&state.db().pool, user_id, location_id)
        .await?
        .ok_or(ApiError::NotFound("location"))
}
