use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    routing::get,
};
use db::models::insight::{Insight, InsightFilter, InsightPoint, MetricTotal};
use serde::Serialize;
use tracing::instrument;
use ts_rs::TS;
use uuid::Uuid;

use super::locations::load_location;
use crate::{AppState, auth::RequestContext, error::ApiError};

const MAX_POINTS_PER_REQUEST: usize = 5000;

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct InsightUpsertResponse {
    pub upserted: u64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/locations/{location_id}/insights",
            get(list_insights).put(upsert_insights),
        )
        .route(
            "/locations/{location_id}/insights/summary",
            get(insight_summary),
        )
}

fn validate_range(filter: &InsightFilter) -> Result<(), ApiError> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from > to
    {
        return Err(ApiError::BadRequest("`from` must not be after `to`".into()));
    }
    Ok(())
}

#[instrument(
    name = "insights.list",
    skip(state, ctx, filter),
    fields(user_id = %ctx.user_id, location_id = %location_id)
)]
async fn list_insights(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Query(filter): Query<InsightFilter>,
) -> Result<Json<Vec<Insight>>, ApiError> {
    validate_range(&filter)?;
    load_location(&state, ctx.user_id, location_id).await?;
    let insights =
        Insight::find_for_location(&state.db().pool, ctx.user_id, location_id, &filter).await?;
    Ok(Json(insights))
}

#[instrument(
    name = "insights.upsert",
    skip(state, ctx, points),
    fields(user_id = %ctx.user_id, location_id = %location_id, count = points.len())
)]
async fn upsert_insights(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Json(points): Json<Vec<InsightPoint>>,
) -> Result<Json<InsightUpsertResponse>, ApiError> {
    if points.len() > MAX_POINTS_PER_REQUEST {
        return Err(ApiError::BadRequest(format!(
            "at most {MAX_POINTS_PER_REQUEST} points per request"
        )));
    }
    if let Some(bad) = points
        .iter()
        .find(|p| p.metric.trim().is_empty() || p.value < 0)
    {
        return Err(ApiError::BadRequest(format!(
            "invalid point for metric `{}` on {}: metric is required and value must not be negative",
            bad.metric, bad.metric_date
        )));
    }
    load_location(&state, ctx.user_id, location_id).await?;

    let upserted =
        Insight::upsert_batch(&state.db().pool, ctx.user_id, location_id, &points).await?;
    Ok(Json(InsightUpsertResponse { upserted }))
}

#[instrument(
    name = "insights.summary",
    skip(state, ctx, filter),
    fields(user_id = %ctx.user_id, location_id = %location_id)
)]
async fn insight_summary(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Query(filter): Query<InsightFilter>,
) -> Result<Json<Vec<MetricTotal>>, ApiError> {
    validate_range(&filter)?;
    load_location(&state, ctx.user_id, location_id).await?;
    let totals = Insight::summary(&state.db().pool, ctx.user_id, location_id, &filter).await?;
    Ok(Json(totals))
}
