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
#[sqlx(type_name = "media_format", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum MediaFormat {
    #[default]
    Photo,
    Video,
}

impl MediaFormat {
    /// Guess the format from a MIME type; anything not `video/*` is a photo.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video/") {
            MediaFormat::Video
        } else {
            MediaFormat::Photo
        }
    }
}

/// A photo or video attached to a location, either pulled from Google
/// (`google_name` set) or uploaded into local storage (`storage_path` set).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct MediaItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub location_id: Uuid,
    pub google_name: Option<String>,
    pub media_format: MediaFormat,
    pub category: Option<String>,
    pub google_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub storage_path: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateMediaItem {
    pub media_format: MediaFormat,
    pub category: Option<String>,
    pub storage_path: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpsertMediaItem {
    pub location_id: Uuid,
    pub google_name: String,
    pub media_format: MediaFormat,
    pub category: Option<String>,
    pub google_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
}

impl MediaItem {
    pub async fn find_for_location(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM media_items
               WHERE user_id = $1 AND location_id = $2
               ORDER BY created_at DESC"#,
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
        sqlx::query_as::<_, Self>("SELECT * FROM media_items WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
        data: &CreateMediaItem,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO media_items
                   (id, user_id, location_id, media_format, category, storage_path, description,
                    created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(location_id)
        .bind(data.media_format)
        .bind(&data.category)
        .bind(&data.storage_path)
        .bind(&data.description)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    /// Hard delete. Returns the removed row so the caller can clean up the
    /// stored file.
    pub async fn delete(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "DELETE FROM media_items WHERE id = $1 AND user_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn count(pool: &SqlitePool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM media_items m
               JOIN locations l ON l.id = m.location_id
               WHERE m.user_id = $1 AND l.deleted_at IS NULL"#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    async fn upsert_one<'e, E>(
        executor: E,
        user_id: Uuid,
        row: &UpsertMediaItem,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"INSERT INTO media_items
                   (id, user_id, location_id, google_name, media_format, category, google_url,
                    thumbnail_url, description, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
               ON CONFLICT (user_id, google_name) DO UPDATE SET
                   media_format = excluded.media_format,
                   category = excluded.category,
                   google_url = excluded.google_url,
                   thumbnail_url = excluded.thumbnail_url,
                   description = COALESCE(excluded.description, media_items.description),
                   updated_at = excluded.updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(row.location_id)
        .bind(&row.google_name)
        .bind(row.media_format)
        .bind(&row.category)
        .bind(&row.google_url)
        .bind(&row.thumbnail_url)
        .bind(&row.description)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn upsert_batch(
        pool: &SqlitePool,
        user_id: Uuid,
        rows: &[UpsertMediaItem],
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_location, create_test_pool};

    #[test]
    fn test_format_from_content_type() {
        assert_eq!(MediaFormat::from_content_type("video/mp4"), MediaFormat::Video);
        assert_eq!(MediaFormat::from_content_type("image/png"), MediaFormat::Photo);
        assert_eq!("VIDEO".parse::<MediaFormat>().unwrap(), MediaFormat::Video);
    }

    #[tokio::test]
    async fn test_uploads_and_synced_media_coexist() {
        let (pool, _dir) = create_test_pool().await;
        let user = Uuid::new_v4();
        let location = create_test_location(&pool, user, "Bakery").await;

        // Uploads have no google_name; NULLs never collide on the unique key.
        for path in ["a.jpg", "b.jpg"] {
            MediaItem::create(
                &pool,
                user,
                location.id,
                &CreateMediaItem {
                    media_format: MediaFormat::Photo,
                    category: Some("EXTERIOR".into()),
                    storage_path: format!("media/{path}"),
                    description: None,
                },
            )
            .await
            .unwrap();
        }

        let synced = UpsertMediaItem {
            location_id: location.id,
            google_name: "accounts/1/locations/1/media/p1".into(),
            media_format: MediaFormat::Photo,
            category: None,
            google_url: Some("https://lh3.example.com/p1".into()),
            thumbnail_url: None,
            description: None,
        };
        MediaItem::upsert_batch(&pool, user, &[synced.clone()]).await.unwrap();
        MediaItem::upsert_batch(&pool, user, &[synced]).await.unwrap();

        assert_eq!(MediaItem::count(&pool, user).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_delete_returns_row() {
        let (pool, _dir) = create_test_pool().await;
        let user = Uuid::new_v4();
        let location = create_test_location(&pool, user, "Bakery").await;
        let item = MediaItem::create(
            &pool,
            user,
            location.id,
            &CreateMediaItem {
                media_format: MediaFormat::Video,
                category: None,
                storage_path: "media/clip.mp4".into(),
                description: Some("Tour".into()),
            },
        )
        .await
        .unwrap();

        assert!(MediaItem::delete(&pool, Uuid::new_v4(), item.id).await.unwrap().is_none());
        let removed = MediaItem::delete(&pool, user, item.id).await.unwrap().unwrap();
        assert_eq!(removed.storage_path.as_deref(), Some("media/clip.mp4"));
        assert!(MediaItem::find_by_id(&pool, user, item.id).await.unwrap().is_none());
    }
}
