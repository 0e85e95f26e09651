use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
};
use db::models::ranking::{CreateRanking, KeywordRanking, Ranking, RankingFilter};
use tracing::instrument;
use uuid::Uuid;

use super::locations::load_location;
use crate::{AppState, auth::RequestContext, error::ApiError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/locations/{location_id}/rankings",
            get(list_rankings).post(create_ranking),
        )
        .route(
            "/locations/{location_id}/rankings/summary",
            get(ranking_summary),
        )
        .route("/rankings/{ranking_id}", delete(delete_ranking))
}

#[instrument(
    name = "rankings.list",
    skip(state, ctx, filter),
    fields(user_id = %ctx.user_id, location_id = %location_id)
)]
async fn list_rankings(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Query(mut filter): Query<RankingFilter>,
) -> Result<Json<Vec<Ranking>>, ApiError> {
    load_location(&state, ctx.user_id, location_id).await?;
    filter.keyword = filter
        .keyword
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty());
    let rankings =
        Ranking::find_for_location(&state.db().pool, ctx.user_id, location_id, &filter).await?;
    Ok(Json(rankings))
}

#[instrument(
    name = "rankings.create",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, location_id = %location_id, keyword = %payload.keyword)
)]
async fn create_ranking(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Json(payload): Json<CreateRanking>,
) -> Result<(StatusCode, Json<Ranking>), ApiError> {
    if payload.keyword.trim().is_empty() {
        return Err(ApiError::BadRequest("keyword is required".into()));
    }
    if payload.position.is_some_and(|p| p < 1) {
        return Err(ApiError::BadRequest("position must be 1 or greater".into()));
    }
    load_location(&state, ctx.user_id, location_id).await?;

    let ranking = Ranking::create(&state.db().pool, ctx.user_id, location_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(ranking)))
}

#[instrument(name = "rankings.summary", skip(state, ctx), fields(user_id = %ctx.user_id, location_id = %location_id))]
async fn ranking_summary(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Vec<KeywordRanking>>, ApiError> {
    load_location(&state, ctx.user_id, location_id).await?;
    let summary = Ranking::summary(&state.db().pool, ctx.user_id, location_id).await?;
    Ok(Json(summary))
}

#[instrument(name = "rankings.delete", skip(state, ctx), fields(user_id = %ctx.user_id, ranking_id = %ranking_id))]
async fn delete_ranking(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(ranking_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if Ranking::delete(&state.db().pool, ctx.user_id, ranking_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("ranking"))
    }
}
