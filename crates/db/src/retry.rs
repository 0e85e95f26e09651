//! SQLite retry logic with backoff.
//!
//! Handles transient SQLite errors like SQLITE_BUSY (code 5) and
//! SQLITE_LOCKED (code 6) which show up when a sync run and user writes
//! overlap.

use std::future::Future;
use std::time::Duration;

use sqlx::Error as SqlxError;
use utils::retry::{RetryPolicy, retry_async};

/// Configuration for SQLite retry behavior.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Caps the exponential growth.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 50,
            max_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_retries.saturating_add(1),
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

/// Check if an error is a transient SQLite error that should be retried.
///
/// Retryable codes:
/// - 5 = SQLITE_BUSY
/// - 6 = SQLITE_LOCKED
/// - 10 = SQLITE_IOERR and its extended codes (`code & 0xFF == 10`)
pub fn is_retryable_error(e: &SqlxError) -> bool {
    let SqlxError::Database(db_err) = e else {
        return false;
    };
    let Some(code) = db_err.code() else {
        return false;
    };
    let code_str = code.as_ref();
    if matches!(code_str, "5" | "6" | "10") {
        return true;
    }
    code_str
        .parse::<u32>()
        .is_ok_and(|code_num| code_num > 10 && (code_num & 0xFF) == 10)
}

/// Execute a database operation, retrying transient SQLite failures.
///
/// ```ignore
/// let n = with_retry(&RetryConfig::default(), "upsert_reviews", || async {
///     Review::upsert_batch(&pool, user_id, &rows).await
/// }).await?;
/// ```
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    f: F,
) -> Result<T, SqlxError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SqlxError>>,
{
    retry_async(&config.policy(), operation_name, is_retryable_error, f).await
}
