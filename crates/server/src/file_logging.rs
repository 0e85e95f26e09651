//! Logging setup: console, daily rolling JSON files, and Sentry.
//!
//! - `RUST_LOG`: level for the workspace crates (default `info`)
//! - `GBP_FILE_LOGGING`: `false`/`0` turns the file layer off
//! - `GBP_LOG_DIR`: log directory (default `{asset_dir}/logs`)
//! - `GBP_LOG_MAX_FILES`: daily files kept (default 7)

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};
use utils::assets::log_dir;

const LOG_FILE_PREFIX: &str = "gbp-hub.log";

#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    pub log_dir: PathBuf,
    pub max_files: usize,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        let enabled = std::env::var("GBP_FILE_LOGGING")
            .map(|v| !(v == "false" || v == "0"))
            .unwrap_or(true);

        let max_files = std::env::var("GBP_LOG_MAX_FILES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(7);

        Self {
            enabled,
            log_dir: log_dir(),
            max_files,
        }
    }
}

fn filter_string(log_level: &str) -> String {
    format!(
        "warn,server={level},services={level},db={level},utils={level},tower_http={level}",
        level = log_level
    )
}

/// Install the global subscriber. The returned guard flushes the file
/// writer when dropped and must live as long as `main`.
pub fn init_logging(log_level: &str) -> Option<WorkerGuard> {
    let config = FileLoggingConfig::default();
    let filter = filter_string(log_level);
    let env_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer().with_filter(env_filter);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(console_layer)
            .with(utils::sentry::sentry_layer())
            .init();
        return None;
    }

    if let Err(e) = std::fs::create_dir_all(&config.log_dir) {
        eprintln!("Failed to create log directory {:?}: {}", config.log_dir, e);
        tracing_subscriber::registry()
            .with(console_layer)
            .with(utils::sentry::sentry_layer())
            .init();
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let file_filter = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(utils::sentry::sentry_layer())
        .init();

    tracing::info!(
        log_dir = ?config.log_dir,
        max_files = config.max_files,
        "File logging enabled"
    );

    let log_dir = config.log_dir.clone();
    let max_files = config.max_files;
    std::thread::spawn(move || cleanup_old_logs(&log_dir, max_files));

    Some(guard)
}

/// Keep only the newest `max_files` log files.
fn cleanup_old_logs(log_dir: &Path, max_files: usize) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };

    let mut log_files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX))
        })
        .filter_map(|e| {
            e.metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .map(|t| (e.path(), t))
        })
        .collect();

    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.into_iter().skip(max_files) {
        if let Err(e) = std::fs::remove_file(&path) {
            tracing::warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            tracing::debug!("Removed old log file: {:?}", path);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{thread::sleep, time::Duration};

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_cleanup_keeps_newest_files() {
        let dir = TempDir::new().unwrap();
        for day in ["2026-10-01", "2026-10-02", "2026-10-03"] {
            std::fs::write(dir.path().join(format!("{LOG_FILE_PREFIX}.{day}")), day).unwrap();
            sleep(Duration::from_millis(20));
        }
        std::fs::write(dir.path().join("unrelated.txt"), "keep").unwrap();

        cleanup_old_logs(dir.path(), 2);

        let mut remaining: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        remaining.sort();
        assert_eq!(
            remaining,
            vec![
                format!("{LOG_FILE_PREFIX}.2026-10-02"),
                format!("{LOG_FILE_PREFIX}.2026-10-03"),
                "unrelated.txt".to_string(),
            ]
        );
    }

    #[test]
    fn test_filter_covers_workspace_crates() {
        let filter = filter_string("debug");
        assert!(filter.starts_with("warn,"));
        assert!(filter.contains("services=debug"));
        assert!(filter.contains("db=debug"));
    }
}
