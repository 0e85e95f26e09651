use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use db::models::post::{CreatePost, Post, PostStatus, UpdatePost};
use tracing::instrument;
use uuid::Uuid;

use super::locations::load_location;
use crate::{AppState, auth::RequestContext, error::ApiError};

/// Google's limit on a local post summary.
const MAX_SUMMARY_CHARS: usize = 1500;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/locations/{location_id}/posts",
            get(list_posts).post(create_post),
        )
        .route(
            "/posts/{post_id}",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/posts/{post_id}/publish", post(publish_post))
}

fn validate_summary(summary: &str) -> Result<(), ApiError> {
    if summary.trim().is_empty() {
        return Err(ApiError::BadRequest("summary is required".into()));
    }
    if summary.chars().count() > MAX_SUMMARY_CHARS {
        return Err(ApiError::BadRequest(format!(
            "summary exceeds {MAX_SUMMARY_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_call_to_action(kind: Option<&str>, url: Option<&str>) -> Result<(), ApiError> {
    // CALL needs no url; every other action links somewhere.
    match (kind, url) {
        (Some(kind), None) if !kind.eq_ignore_ascii_case("call") => Err(ApiError::BadRequest(
            format!("call_to_action_url is required for {kind}"),
        )),
        (None, Some(_)) => Err(ApiError::BadRequest(
            "call_to_action_url needs a call_to_action_type".into(),
        )),
        _ => Ok(()),
    }
}

#[instrument(name = "posts.list", skip(state, ctx), fields(user_id = %ctx.user_id, location_id = %location_id))]
async fn list_posts(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Vec<Post>>, ApiError> {
    load_location(&state, ctx.user_id, location_id).await?;
    let posts = Post::find_for_location(&state.db().pool, ctx.user_id, location_id).await?;
    Ok(Json(posts))
}

#[instrument(
    name = "posts.create",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, location_id = %location_id)
)]
async fn create_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    Json(payload): Json<CreatePost>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    validate_summary(&payload.summary)?;
    validate_call_to_action(
        payload.call_to_action_type.as_deref(),
        payload.call_to_action_url.as_deref(),
    )?;
    load_location(&state, ctx.user_id, location_id).await?;

    let post = Post::create(&state.db().pool, ctx.user_id, location_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(name = "posts.get", skip(state, ctx), fields(user_id = %ctx.user_id, post_id = %post_id))]
async fn get_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Post>, ApiError> {
    load_post(&state, ctx.user_id, post_id).await.map(Json)
}

#[instrument(
    name = "posts.update",
    skip(state, ctx, payload),
    fields(user_id = %ctx.user_id, post_id = %post_id)
)]
async fn update_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<UpdatePost>,
) -> Result<Json<Post>, ApiError> {
    if let Some(summary) = payload.summary.as_deref() {
        validate_summary(summary)?;
    }

    let existing = load_post(&state, ctx.user_id, post_id).await?;
    if existing.status == PostStatus::Published {
        return Err(ApiError::Conflict(
            "published posts cannot be edited".into(),
        ));
    }
    validate_call_to_action(
        payload
            .call_to_action_type
            .as_deref()
            .or(existing.call_to_action_type.as_deref()),
        payload
            .call_to_action_url
            .as_deref()
            .or(existing.call_to_action_url.as_deref()),
    )?;

    Post::update(&state.db().pool, ctx.user_id, post_id, &payload)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::Conflict("published posts cannot be edited".into()))
}

#[instrument(name = "posts.delete", skip(state, ctx), fields(user_id = %ctx.user_id, post_id = %post_id))]
async fn delete_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(post_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if Post::soft_delete(&state.db().pool, ctx.user_id, post_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("post"))
    }
}

#[instrument(name = "posts.publish", skip(state, ctx), fields(user_id = %ctx.user_id, post_id = %post_id))]
async fn publish_post(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Post>, ApiError> {
    let post = state.sync().publish_post(ctx.user_id, post_id).await?;
    Ok(Json(post))
}

async fn load_post(state: &AppState, user_id: Uuid, post_id: Uuid) -> Result<Post, ApiError> {
    Post::find_by_id(&state.db().pool, user_id, post_id)
        .await?
        .ok_or(ApiError::NotFound("post"))
}
