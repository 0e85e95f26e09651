use axum::{
    Json, Router,
    extract::{Extension, State},
    routing::{get, post},
};
use serde::Serialize;
use services::services::ai::{GenerateRequest, Generated};
use tracing::instrument;
use ts_rs::TS;

use crate::{AppState, auth::RequestContext, error::ApiError};

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct ProvidersResponse {
    pub providers: Vec<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ai/generate", post(generate))
        .route("/ai/providers", get(list_providers))
}

/// Never fails on provider errors; the response says whether canned text
/// was used instead.
#[instrument(
    name = "ai.generate",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, kind = ?payload.kind)
)]
async fn generate(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<Generated>, ApiError> {
    if payload.context.star_rating.is_some_and(|r| !(1..=5).contains(&r)) {
        return Err(ApiError::BadRequest(
            "star_rating must be between 1 and 5".into(),
        ));
    }
    let generated = state.ai().generate(payload.kind, &payload.context).await;
    Ok(Json(generated))
}

async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state
            .ai()
            .provider_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}
