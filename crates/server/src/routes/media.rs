use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Extension, Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get},
};
use db::models::media_item::{CreateMediaItem, MediaFormat, MediaItem};
use serde::Serialize;
use services::services::storage::{
    MEDIA_BUCKET, StorageService, StoredObject, guess_content_type, object_key,
};
use tracing::{instrument, warn};
use ts_rs::TS;
use uuid::Uuid;

use super::locations::load_location;
use crate::{AppState, auth::RequestContext, error::ApiError};

const MAX_UPLOAD_BYTES: usize = 75 * 1024 * 1024;

/// A media row plus where its locally stored file can be fetched from.
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct MediaItemResponse {
    #[serde(flatten)]
    #[ts(flatten)]
    pub item: MediaItem,
    pub public_url: Option<String>,
}

impl MediaItemResponse {
    fn new(storage: &StorageService, item: MediaItem) -> Self {
        let public_url = item
            .storage_path
            .as_deref()
            .and_then(|path| storage.public_url(MEDIA_BUCKET, path).ok())
            .or_else(|| item.google_url.clone());
        Self { item, public_url }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/locations/{location_id}/media",
            get(list_media)
                .post(upload_media)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/locations/{location_id}/media/files", get(list_stored_files))
        .route("/media/{media_id}", delete(delete_media))
}

#[instrument(name = "media.list", skip(state, ctx), fields(user_id = %ctx.user_id, location_id = %location_id))]
async fn list_media(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Vec<MediaItemResponse>>, ApiError> {
    load_location(&state, ctx.user_id, location_id).await?;
    let items = MediaItem::find_for_location(&state.db().pool, ctx.user_id, location_id).await?;
    Ok(Json(
        items
            .into_iter()
            .map(|item| MediaItemResponse::new(state.storage(), item))
            .collect(),
    ))
}

/// Files uploaded for the location as they sit in storage, including any
/// whose media row is gone.
#[instrument(name = "media.files", skip(state, ctx), fields(user_id = %ctx.user_id, location_id = %location_id))]
async fn list_stored_files(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
) -> Result<Json<Vec<StoredObject>>, ApiError> {
    load_location(&state, ctx.user_id, location_id).await?;
    let prefix = format!("{location_id}/");
    let objects = state.storage().list(MEDIA_BUCKET, Some(&prefix)).await?;
    Ok(Json(objects))
}

/// Multipart fields: `file` (required), `description`, `category`.
#[instrument(
    name = "media.upload",
    skip(state, ctx, multipart),
    fields(user_id = %ctx.user_id, location_id = %location_id)
)]
async fn upload_media(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(location_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MediaItemResponse>), ApiError> {
    load_location(&state, ctx.user_id, location_id).await?;

    let mut upload = None;
    let mut description = None;
    let mut category = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| guess_content_type(&file_name));
                let bytes = field.bytes().await?;
                upload = Some((file_name, content_type, bytes));
            }
            Some("description") => description = non_empty(field.text().await?),
            Some("category") => category = non_empty(field.text().await?),
            _ => {}
        }
    }

    let Some((file_name, content_type, bytes)) = upload else {
        return Err(ApiError::BadRequest("multipart field `file` is required".into()));
    };
    let media_format = MediaFormat::from_content_type(&content_type);
    if !content_type.starts_with("image/") && media_format != MediaFormat::Video {
        return Err(ApiError::BadRequest(format!(
            "unsupported media type {content_type}"
        )));
    }

    let key = object_key(&location_id.to_string(), &file_name);
    let stored = state
        .storage()
        .upload(MEDIA_BUCKET, &key, &bytes, Some(&content_type))
        .await?;

    let created = MediaItem::create(
        &state.db().pool,
        ctx.user_id,
        location_id,
        &CreateMediaItem {
            media_format,
            category,
            storage_path: stored.path.clone(),
            description,
        },
    )
    .await;
    let item = match created {
        Ok(item) => item,
        Err(e) => {
            if let Err(cleanup) = state.storage().delete(MEDIA_BUCKET, &stored.path).await {
                warn!(error = %cleanup, path = %stored.path, "Failed to remove orphaned upload");
            }
            return Err(e.into());
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(MediaItemResponse {
            item,
            public_url: Some(stored.public_url),
        }),
    ))
}

#[instrument(name = "media.delete", skip(state, ctx), fields(user_id = %ctx.user_id, media_id = %media_id))]
async fn delete_media(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(media_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let item = MediaItem::delete(&state.db().pool, ctx.user_id, media_id)
        .await?
        .ok_or(ApiError::NotFound("media item"))?;

    if let Some(path) = item.storage_path.as_deref()
        && let Err(error) = state.storage().delete(MEDIA_BUCKET, path).await
    {
        warn!(%error, path, "Stored file could not be removed");
    }
    Ok(StatusCode::NO_CONTENT)
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
