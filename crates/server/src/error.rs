use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::citation::CitationError;
use serde_json::json;
use services::services::{
    gmb_sync::SyncError, google::GoogleError, storage::StorageError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Google(#[from] GoogleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Citation(#[from] CitationError),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Unique constraint violations become 409 with `message`.
    pub fn conflict_on_unique(err: sqlx::Error, message: &str) -> Self {
        if let sqlx::Error::Database(db) = &err
            && db.is_unique_violation()
        {
            return ApiError::Conflict(message.to_string());
        }
        ApiError::Database(err)
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Google(_) => StatusCode::BAD_GATEWAY,
            ApiError::Sync(e) => match e {
                SyncError::Google(_) => StatusCode::BAD_GATEWAY,
                SyncError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SyncError::NotFound(_) => StatusCode::NOT_FOUND,
                SyncError::NoCredentials(_) | SyncError::NotLinked(_) => StatusCode::CONFLICT,
                SyncError::InvalidPost(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::Storage(e) => match e {
                StorageError::InvalidBucket(_) | StorageError::InvalidPath(_) | StorageError::Empty => {
                    StatusCode::BAD_REQUEST
                }
                StorageError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Citation(e) => match e {
                CitationError::DuplicateDirectory(_) => StatusCode::CONFLICT,
                CitationError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            if status == StatusCode::BAD_GATEWAY {
                tracing::warn!(error = %self, "upstream call failed");
            }
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
