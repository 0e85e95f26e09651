use std::path::PathBuf;

use directories::ProjectDirs;

use crate::path::expand_tilde;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");

/// Root directory for everything the backend writes to disk.
///
/// Debug builds keep data next to the workspace in `dev_assets/`; release
/// builds use the platform data directory.
pub fn asset_dir() -> PathBuf {
    let path = if cfg!(debug_assertions) {
        PathBuf::from(PROJECT_ROOT).join("../../dev_assets")
    } else {
        ProjectDirs::from("com", "gbphub", "gbp-hub")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".gbp-hub"))
    };

    if !path.exists()
        && let Err(e) = std::fs::create_dir_all(&path)
    {
        tracing::warn!(path = %path.display(), "Failed to create asset directory: {}", e);
    }

    path
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(|p| expand_tilde(&p))
}

/// Get the database file path.
///
/// Respects `GBP_DATABASE_PATH`. Default: `{asset_dir}/db.sqlite`
pub fn database_path() -> PathBuf {
    env_path("GBP_DATABASE_PATH").unwrap_or_else(|| asset_dir().join("db.sqlite"))
}

/// Root of the object storage buckets.
///
/// Respects `GBP_STORAGE_DIR`. Default: `{asset_dir}/storage`
pub fn storage_dir() -> PathBuf {
    env_path("GBP_STORAGE_DIR").unwrap_or_else(|| asset_dir().join("storage"))
}

/// Directory for rolling log files.
///
/// Respects `GBP_LOG_DIR`. Default: `{asset_dir}/logs`
pub fn log_dir() -> PathBuf {
    env_path("GBP_LOG_DIR").unwrap_or_else(|| asset_dir().join("logs"))
}
