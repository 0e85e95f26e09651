use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display)]
#[sqlx(type_name = "sync_job_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncJobType {
    Accounts,
    Locations,
    Reviews,
    Media,
    Posts,
    Full,
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "sync_job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SyncJobStatus {
    #[default]
    Running,
    Succeeded,
    Failed,
}

/// Outcome record for one sync run.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct SyncJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub job_type: SyncJobType,
    pub account_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    pub status: SyncJobStatus,
    pub items_synced: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl SyncJob {
    pub async fn start(
        pool: &SqlitePool,
        user_id: Uuid,
        job_type: SyncJobType,
        account_id: Option<Uuid>,
        location_id: Option<Uuid>,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO sync_jobs (id, user_id, job_type, account_id, location_id, status, started_at)
               VALUES ($1, $2, $3, $4, $5, 'running', $6)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(job_type)
        .bind(account_id)
        .bind(location_id)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    async fn finish(
        pool: &SqlitePool,
        id: Uuid,
        status: SyncJobStatus,
        items_synced: u64,
        error_message: Option<&str>,
    ) -> Result<Self, sqlx::Error> {
        let job = sqlx::query_as::<_, Self>("SELECT * FROM sync_jobs WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        let finished_at = Utc::now();
        let duration_ms = (finished_at - job.started_at).num_milliseconds().max(0);

        sqlx::query_as::<_, Self>(
            r#"UPDATE sync_jobs
               SET status = $2, items_synced = $3, error_message = $4,
                   finished_at = $5, duration_ms = $6
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(status)
        .bind(i64::try_from(items_synced).unwrap_or(i64::MAX))
        .bind(error_message)
        .bind(finished_at)
        .bind(duration_ms)
        .fetch_one(pool)
        .await
    }

    pub async fn finish_success(
        pool: &SqlitePool,
        id: Uuid,
        items_synced: u64,
    ) -> Result<Self, sqlx::Error> {
        Self::finish(pool, id, SyncJobStatus::Succeeded, items_synced, None).await
    }

    /// Succeeded overall, but some parts were skipped; `note` says which.
    pub async fn finish_partial(
        pool: &SqlitePool,
        id: Uuid,
        items_synced: u64,
        note: &str,
    ) -> Result<Self, sqlx::Error> {
        Self::finish(pool, id, SyncJobStatus::Succeeded, items_synced, Some(note)).await
    }

    /// `items_synced` is what landed before the failure.
    pub async fn finish_failure(
        pool: &SqlitePool,
        id: Uuid,
        items_synced: u64,
        error: &str,
    ) -> Result<Self, sqlx::Error> {
        Self::finish(pool, id, SyncJobStatus::Failed, items_synced, Some(error)).await
    }

    pub async fn find_recent(
        pool: &SqlitePool,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM sync_jobs
               WHERE user_id = $1
               ORDER BY started_at DESC
               LIMIT $2"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM sync_jobs WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn latest_for_user(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        Ok(Self::find_recent(pool, user_id, 1).await?.into_iter().next())
    }

    /// Jobs left `running` by a process that died mid-sync.
    pub async fn fail_abandoned(pool: &SqlitePool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE sync_jobs
               SET status = 'failed', error_message = 'interrupted by restart', finished_at = $1
               WHERE status = 'running'"#,
        )
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
