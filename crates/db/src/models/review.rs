use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use crate::UPSERT_CHUNK_SIZE;

/// A customer review pulled from Google.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub location_id: Uuid,
    pub google_review_id: String,
    /// `accounts/{a}/locations/{l}/reviews/{r}`, needed to post replies
    pub google_name: String,
    pub reviewer_name: Option<String>,
    pub reviewer_photo_url: Option<String>,
    /// 1..=5
    pub star_rating: i64,
    pub comment: Option<String>,
    pub reply_comment: Option<String>,
    pub reply_updated_at: Option<DateTime<Utc>>,
    pub review_created_at: Option<DateTime<Utc>>,
    pub review_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct ReviewFilter {
    pub rating: Option<i64>,
    #[serde(default)]
    pub unreplied: bool,
}

#[derive(Debug, Clone)]
pub struct UpsertReview {
    pub location_id: Uuid,
    pub google_review_id: String,
    pub google_name: String,
    pub reviewer_name: Option<String>,
    pub reviewer_photo_url: Option<String>,
    pub star_rating: i64,
    pub comment: Option<String>,
    pub reply_comment: Option<String>,
    pub reply_updated_at: Option<DateTime<Utc>>,
    pub review_created_at: Option<DateTime<Utc>>,
    pub review_updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, TS, FromRow)]
pub struct ReviewStats {
    pub total: i64,
    pub average_rating: Option<f64>,
    pub unreplied: i64,
}

impl Review {
    pub async fn find_for_location(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
        filter: &ReviewFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM reviews
               WHERE user_id = $1
                 AND location_id = $2
                 AND ($3 IS NULL OR star_rating = $3)
                 AND ($4 = 0 OR reply_comment IS NULL)
               ORDER BY review_created_at DESC, created_at DESC"#,
        )
        .bind(user_id)
        .bind(location_id)
        .bind(filter.rating)
        .bind(filter.unreplied)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM reviews WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Set or replace the owner's reply.
    pub async fn set_reply(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
        comment: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"UPDATE reviews
               SET reply_comment = $3, reply_updated_at = $4, updated_at = $4
               WHERE id = $1 AND user_id = $2
               RETURNING *"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(comment)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    pub async fn clear_reply(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"UPDATE reviews
               SET reply_comment = NULL, reply_updated_at = NULL, updated_at = $3
               WHERE id = $1 AND user_id = $2
               RETURNING *"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    /// Aggregate review numbers, optionally narrowed to one location.
    pub async fn stats(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Option<Uuid>,
    ) -> Result<ReviewStats, sqlx::Error> {
        sqlx::query_as::<_, ReviewStats>(
            r#"SELECT
                   COUNT(*) AS total,
                   AVG(r.star_rating) AS average_rating,
                   COALESCE(SUM(CASE WHEN r.reply_comment IS NULL THEN 1 ELSE 0 END), 0) AS unreplied
               FROM reviews r
               JOIN locations l ON l.id = r.location_id
               WHERE r.user_id = $1
                 AND l.deleted_at IS NULL
                 AND ($2 IS NULL OR r.location_id = $2)"#,
        )
        .bind(user_id)
        .bind(location_id)
        .fetch_one(pool)
        .await
    }

    async fn upsert_one<'e, E>(
        executor: E,
        user_id: Uuid,
        row: &UpsertReview,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"INSERT INTO reviews
                   (id, user_id, location_id, google_review_id, google_name, reviewer_name,
                    reviewer_photo_url, star_rating, comment, reply_comment, reply_updated_at,
                    review_created_at, review_updated_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14)
               ON CONFLICT (user_id, google_review_id) DO UPDATE SET
                   location_id = excluded.location_id,
                   google_name = excluded.google_name,
                   reviewer_name = excluded.reviewer_name,
                   reviewer_photo_url = excluded.reviewer_photo_url,
                   star_rating = excluded.star_rating,
                   comment = excluded.comment,
                   reply_comment = excluded.reply_comment,
                   reply_updated_at = excluded.reply_updated_at,
                   review_created_at = excluded.review_created_at,
                   review_updated_at = excluded.review_updated_at,
                   updated_at = excluded.updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(row.location_id)
        .bind(&row.google_review_id)
        .bind(&row.google_name)
        .bind(&row.reviewer_name)
        .bind(&row.reviewer_photo_url)
        .bind(row.star_rating)
        .bind(&row.comment)
        .bind(&row.reply_comment)
        .bind(row.reply_updated_at)
        .bind(row.review_created_at)
        .bind(row.review_updated_at)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert-or-update reviews keyed on `(user_id, google_review_id)`.
    pub async fn upsert_batch(
        pool: &SqlitePool,
        user_id: Uuid,
        rows: &[UpsertReview],
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

    fn review(location_id: Uuid, id: &str, stars: i64, reply: Option<&str>) -> UpsertReview {
        UpsertReview {
            location_id,
            google_review_id: id.to_string(),
            google_name: format!("accounts/1/locations/1/reviews/{id}"),
            reviewer_name: Some("Pat".to_string()),
            reviewer_photo_url: None,
            star_rating: stars,
            comment: Some("Great bread".to_string()),
            reply_comment: reply.map(str::to_string),
            reply_updated_at: None,
            review_created_at: Some(Utc::now()),
            review_updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_filters_and_stats() {
        let (pool, _dir) = create_test_pool().await;
        let user = Uuid::new_v4();
        let location = create_test_location(&pool, user, "Bakery").await;

        let rows = vec![
            review(location.id, "a", 5, Some("Thanks!")),
            review(location.id, "b", 3, None),
            review(location.id, "c", 1, None),
        ];
        Review::upsert_batch(&pool, user, &rows).await.unwrap();

        let unreplied = ReviewFilter {
            rating: None,
            unreplied: true,
        };
        let found = Review::find_for_location(&pool, user, location.id, &unreplied)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let five_star = ReviewFilter {
            rating: Some(5),
            unreplied: false,
        };
        let found = Review::find_for_location(&pool, user, location.id, &five_star)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let stats = Review::stats(&pool, user, Some(location.id)).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unreplied, 2);
        assert_eq!(stats.average_rating, Some(3.0));
    }

    #[tokio::test]
    async fn test_reply_round_trip() {
        let (pool, _dir) = create_test_pool().await;
        let user = Uuid::new_v4();
        let location = create_test_location(&pool, user, "Bakery").await;
        Review::upsert_batch(&pool, user, &[review(location.id, "a", 4, None)])
            .await
            .unwrap();
        let stored = &Review::find_for_location(&pool, user, location.id, &ReviewFilter::default())
            .await
            .unwrap()[0];

        let replied = Review::set_reply(&pool, user, stored.id, "Thank you")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(replied.reply_comment.as_deref(), Some("Thank you"));
        assert!(replied.reply_updated_at.is_some());

        let cleared = Review::clear_reply(&pool, user, stored.id).await.unwrap().unwrap();
        assert!(cleared.reply_comment.is_none());

        let other_user = Uuid::new_v4();
        assert!(Review::set_reply(&pool, other_user, stored.id, "hijack")
            .await
            .unwrap()
            .is_none());
    }
}
