use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use crate::UPSERT_CHUNK_SIZE;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Scheduled,
    Published,
    Failed,
}

/// Local post topic. Google spells these in upper case (`STANDARD`, ...).
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "post_topic_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum PostTopicType {
    #[default]
    Standard,
    Event,
    Offer,
    Alert,
}

impl PostTopicType {
    pub fn as_google(&self) -> &'static str {
        match self {
            PostTopicType::Standard => "STANDARD",
            PostTopicType::Event => "EVENT",
            PostTopicType::Offer => "OFFER",
            PostTopicType::Alert => "ALERT",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub location_id: Uuid,
    /// Set once the post exists on Google
    pub google_name: Option<String>,
    pub topic_type: PostTopicType,
    pub summary: String,
    pub call_to_action_type: Option<String>,
    pub call_to_action_url: Option<String>,
    pub media_url: Option<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreatePost {
    #[serde(default)]
    pub topic_type: PostTopicType,
    pub summary: String,
    pub call_to_action_type: Option<String>,
    pub call_to_action_url: Option<String>,
    pub media_url: Option<String>,
    /// A future time makes the post `scheduled`, otherwise it is a draft.
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdatePost {
    pub topic_type: Option<PostTopicType>,
    pub summary: Option<String>,
    pub call_to_action_type: Option<String>,
    pub call_to_action_url: Option<String>,
    pub media_url: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Local post as reported by Google; always `published`.
#[derive(Debug, Clone)]
pub struct UpsertPost {
    pub location_id: Uuid,
    pub google_name: String,
    pub topic_type: PostTopicType,
    pub summary: String,
    pub call_to_action_type: Option<String>,
    pub call_to_action_url: Option<String>,
    pub media_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, TS)]
pub struct PostStatusCounts {
    pub draft: i64,
    pub scheduled: i64,
    pub published: i64,
    pub failed: i64,
}

impl Post {
    pub async fn find_for_location(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM posts
               WHERE user_id = $1 AND location_id = $2 AND deleted_at IS NULL
               ORDER BY COALESCE(published_at, scheduled_at, created_at) DESC"#,
        )
        .bind(user_id)
        .bind(location_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM posts WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Scheduled posts whose time has come, across all users.
    pub async fn find_due_scheduled(
        pool: &SqlitePool,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM posts
               WHERE status = 'scheduled' AND scheduled_at <= $1 AND deleted_at IS NULL
               ORDER BY scheduled_at ASC"#,
        )
        .bind(now)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
        data: &CreatePost,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        let status = match data.scheduled_at {
            Some(at) if at > now => PostStatus::Scheduled,
            _ => PostStatus::Draft,
        };
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO posts
                   (id, user_id, location_id, topic_type, summary, call_to_action_type,
                    call_to_action_url, media_url, status, scheduled_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(location_id)
        .bind(data.topic_type)
        .bind(&data.summary)
        .bind(&data.call_to_action_type)
        .bind(&data.call_to_action_url)
        .bind(&data.media_url)
        .bind(status)
        .bind(data.scheduled_at)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    /// Edit a post that has not been published yet. Published posts are
    /// left untouched and `None` is returned.
    pub async fn update(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
        data: &UpdatePost,
    ) -> Result<Option<Self>, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"UPDATE posts
               SET topic_type = COALESCE($3, topic_type),
                   summary = COALESCE($4, summary),
                   call_to_action_type = COALESCE($5, call_to_action_type),
                   call_to_action_url = COALESCE($6, call_to_action_url),
                   media_url = COALESCE($7, media_url),
                   scheduled_at = COALESCE($8, scheduled_at),
                   status = CASE
                       WHEN COALESCE($8, scheduled_at) > $9 THEN 'scheduled'
                       ELSE 'draft'
                   END,
                   error_message = NULL,
                   updated_at = $9
               WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL AND status != 'published'
               RETURNING *"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(data.topic_type)
        .bind(&data.summary)
        .bind(&data.call_to_action_type)
        .bind(&data.call_to_action_url)
        .bind(&data.media_url)
        .bind(data.scheduled_at)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    pub async fn soft_delete(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE posts SET deleted_at = $3, updated_at = $3
               WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_published(
        pool: &SqlitePool,
        id: Uuid,
        google_name: &str,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"UPDATE posts
               SET status = 'published', google_name = $2, published_at = $3,
                   error_message = NULL, updated_at = $3
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(google_name)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn mark_failed(pool: &SqlitePool, id: Uuid, error: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"UPDATE posts SET status = 'failed', error_message = $2, updated_at = $3
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn status_counts(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<PostStatusCounts, sqlx::Error> {
        let rows: Vec<(PostStatus, i64)> = sqlx::query_as(
            r#"SELECT p.status, COUNT(*)
               FROM posts p
               JOIN locations l ON l.id = p.location_id
               WHERE p.user_id = $1 AND p.deleted_at IS NULL AND l.deleted_at IS NULL
               GROUP BY p.status"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        let mut counts = PostStatusCounts::default();
        for (status, n) in rows {
            match status {
                PostStatus::Draft => counts.draft = n,
                PostStatus::Scheduled => counts.scheduled = n,
                PostStatus::Published => counts.published = n,
                PostStatus::Failed => counts.failed = n,
            }
        }
        Ok(counts)
    }

    async fn upsert_one<'e, E>(
        executor: E,
        user_id: Uuid,
        row: &UpsertPost,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"INSERT INTO posts
                   (id, user_id, location_id, google_name, topic_type, summary, call_to_action_type,
                    call_to_action_url, media_url, status, published_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'published', $10, $11, $11)
               ON CONFLICT (user_id, google_name) DO UPDATE SET
                   topic_type = excluded.topic_type,
                   summary = excluded.summary,
                   call_to_action_type = excluded.call_to_action_type,
                   call_to_action_url = excluded.call_to_action_url,
                   media_url = excluded.media_url,
                   status = 'published',
                   published_at = excluded.published_at,
                   error_message = NULL,
                   deleted_at = NULL,
                   updated_at = excluded.updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(row.location_id)
        .bind(&row.google_name)
        .bind(row.topic_type)
        .bind(&row.summary)
        .bind(&row.call_to_action_type)
        .bind(&row.call_to_action_url)
        .bind(&row.media_url)
        .bind(row.published_at)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert-or-update posts keyed on `(user_id, google_name)`.
    pub async fn upsert_batch(
        pool: &SqlitePool,
        user_id: Uuid,
        rows: &[UpsertPost],
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let mut affected = 0;
        for chunk in rows.chunks(UPSERT_CHUNK_SIZE) {
            let mut tx = pool.begin().await?;
            for row in chunk {
                affected += Self::upsert_one(&mut *tx, user_id, row, now).await?;
            }
            tx.commit().await?;
        }
        Ok(affected)
    }
}
