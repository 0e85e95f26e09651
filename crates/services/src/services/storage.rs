//! Bucketed object storage on the local filesystem.
//!
//! Objects live at `<root>/<bucket>/<path>` and are served publicly by the
//! server under `/storage/<bucket>/<path>`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use uuid::Uuid;

use crate::services::config::StorageConfig;

/// Bucket for media uploaded through the dashboard.
pub const MEDIA_BUCKET: &str = "media";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid bucket name `{0}`")]
    InvalidBucket(String),
    #[error("invalid object path `{0}`")]
    InvalidPath(String),
    #[error("object is empty")]
    Empty,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct StoredObject {
    pub bucket: String,
    pub path: String,
    pub size: u64,
    pub content_type: String,
    pub public_url: String,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StorageService {
    root: PathBuf,
    public_base_url: String,
}

impl StorageService {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.root, &config.public_base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` to `bucket/path`, replacing any existing object.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: &[u8],
        content_type: Option<&str>,
    ) -> Result<StoredObject, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Empty);
        }
        let target = self.resolve(bucket, path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        info!(bucket, path, size = bytes.len(), "Stored object");

        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(path));
        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
            size: bytes.len() as u64,
            content_type,
            public_url: self.public_url(bucket, path)?,
            modified_at: Some(Utc::now()),
        })
    }

    /// Objects in `bucket` whose path starts with `prefix`, sorted by path.
    pub async fn list(
        &self,
        bucket: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<StoredObject>, StorageError> {
        validate_bucket(bucket)?;
        let bucket_dir = self.root.join(bucket);
        if !tokio::fs::try_exists(&bucket_dir).await? {
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        let mut pending = vec![bucket_dir.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let metadata = entry.metadata().await?;
                if metadata.is_dir() {
                    pending.push(entry.path());
                    continue;
                }
                let Some(path) = relative_key(&bucket_dir, &entry.path()) else {
                    continue;
                };
                if prefix.is_some_and(|p| !path.starts_with(p)) {
                    continue;
                }
                objects.push(StoredObject {
                    bucket: bucket.to_string(),
                    content_type: guess_content_type(&path),
                    public_url: format!("{}/storage/{bucket}/{path}", self.public_base_url),
                    size: metadata.len(),
                    modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
                    path,
                });
            }
        }
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }

    /// Returns false when the object did not exist.
    pub async fn delete(&self, bucket: &str, path: &str) -> Result<bool, StorageError> {
        let target = self.resolve(bucket, path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => {
                debug!(bucket, path, "Deleted object");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> Result<String, StorageError> {
        validate_bucket(bucket)?;
        validate_path(path)?;
        Ok(format!("{}/storage/{bucket}/{path}", self.public_base_url))
    }

    /// Filesystem location of `bucket/path`, after validation.
    pub fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, StorageError> {
        validate_bucket(bucket)?;
        validate_path(path)?;
        Ok(path
            .split('/')
            .fold(self.root.join(bucket), |acc, part| acc.join(part)))
    }
}

/// Key for a new upload: `<prefix>/<uuid>-<sanitized file name>`.
pub fn object_key(prefix: &str, file_name: &str) -> String {
    let sanitized: String = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches(|c| c == '.' || c == '-');
    let name = if sanitized.is_empty() { "upload" } else { sanitized };
    format!("{prefix}/{}-{name}", Uuid::new_v4())
}

pub fn guess_content_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn validate_bucket(bucket: &str) -> Result<(), StorageError> {
    let valid = !bucket.is_empty()
        && bucket.len() <= 63
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidBucket(bucket.to_string()))
    }
}

fn validate_path(path: &str) -> Result<(), StorageError> {
    let invalid = path.is_empty()
        || path.len() > 1024
        || path.contains('\\')
        || path.contains('\0')
        || path
            .split('/')
            .any(|part| part.is_empty() || part == "." || part == "..");
    if invalid {
        Err(StorageError::InvalidPath(path.to_string()))
    } else {
        Ok(())
    }
}

fn relative_key(bucket_dir: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(bucket_dir).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
