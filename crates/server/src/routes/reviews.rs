use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    routing::{get, put},
};
use db::models::review::{Review, ReviewFilter, ReviewStats};
use serde::Deserialize;
use tracing::instrument;
use ts_rs::TS;
use uuid::Uuid;

use super::locations::load_location;
use crate::{AppState, auth::RequestContext, error::ApiError};

/// Google's limit on reply length.
const MAX_REPLY_CHARS: usize = 4096;

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct ReplyRequest {
    pub comment: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/locations/{location_id}/reviews", get(list_reviews))
        .route("/locations/{location_id}/reviews/stats", get(review_stats))
        .route("/reviews/{review_id}", get(get_review))
        .route(
            "/reviews/{review_id}/reply",
            put(reply_to_review).delete(delete_reply),
        )
}

#[instrument(
    name = "reviews.list",
    skip(state, ctx, filter),
    fields(user_id = %ctx.user_id, location_id = %location_id)
)]
async fn list_reviews(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Query(filter): Query<ReviewFilter>,
) -> Result<Json<Vec<Review>>, ApiError> {
    if filter.rating.is_some_and(|r| !(1..=5).contains(&r)) {
        return Err(ApiError::BadRequest("rating must be between 1 and 5".into()));
    }
    load_location(&state, ctx.user_id, location_id).await?;
    let reviews =
        Review::find_for_location(&state.db().pool, ctx.user_id, location_id, &filter).await?;
    Ok(Json(reviews))
}

#[instrument(name = "reviews.stats", skip(state, ctx), fields(user_id = %ctx.user_id, location_id = %location_id))]
async fn review_stats(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<ReviewStats>, ApiError> {
    load_location(&state, ctx.user_id, location_id).await?;
    let stats = Review::stats(&state.db().pool, ctx.user_id, Some(location_id)).await?;
    Ok(Json(stats))
}

#[instrument(name = "reviews.get", skip(state, ctx), fields(user_id = %ctx.user_id, review_id = %review_id))]
async fn get_review(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(review_id): Path<Uuid>,
) -> Result<Json<Review>, ApiError> {
    Review::find_by_id(&state.db().pool, ctx.user_id, review_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound("review"))
}

#[instrument(
    name = "reviews.reply",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, review_id = %review_id)
)]
async fn reply_to_review(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(review_id): Path<Uuid>,
    Json(payload): Json<ReplyRequest>,
) -> Result<Json<Review>, ApiError> {
    let comment = payload.comment.trim();
    if comment.is_empty() {
        return Err(ApiError::BadRequest("comment is required".into()));
    }
    if comment.chars().count() > MAX_REPLY_CHARS {
        return Err(ApiError::BadRequest(format!(
            "comment exceeds {MAX_REPLY_CHARS} characters"
        )));
    }

    let review = state
        .sync()
        .reply_to_review(ctx.user_id, review_id, comment)
        .await?;
    Ok(Json(review))
}

#[instrument(name = "reviews.delete_reply", skip(state, ctx), fields(user_id = %ctx.user_id, review_id = %review_id))]
async fn delete_reply(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(review_id): Path<Uuid>,
) -> Result<Json<Review>, ApiError> {
    let review = state
        .sync()
        .delete_review_reply(ctx.user_id, review_id)
        .await?;
    Ok(Json(review))
}
