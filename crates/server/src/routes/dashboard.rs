use axum::{Extension, Json, Router, extract::State, routing::get};
use db::models::dashboard::DashboardStats;
use tracing::instrument;

use crate::{AppState, auth::RequestContext, error::ApiError};

pub fn router() -> Router<AppState> {
    Router::new().route("/dashboard", get(get_dashboard))
}

#[instrument(name = "dashboard.get", skip(state, ctx), fields(user_id = %ctx.user_id))]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<DashboardStats>, ApiError> {
    let stats = DashboardStats::load(&state.db().pool, ctx.user_id).await?;
    Ok(Json(stats))
}
