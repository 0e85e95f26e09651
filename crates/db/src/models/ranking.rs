use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

/// One observation of where a location ranked for a keyword. `position` is
/// `None` when the location did not appear in the results.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Ranking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub location_id: Uuid,
    pub keyword: String,
    pub search_engine: String,
    pub position: Option<i64>,
    pub checked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateRanking {
    pub keyword: String,
    pub search_engine: Option<String>,
    pub position: Option<i64>,
    /// Defaults to now
    pub checked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct RankingFilter {
    pub keyword: Option<String>,
}

/// Latest observation per keyword and how it moved since the one before.
#[derive(Debug, Clone, Serialize, TS)]
pub struct KeywordRanking {
    pub keyword: String,
    pub search_engine: String,
    pub position: Option<i64>,
    pub previous_position: Option<i64>,
    /// Positive means the location moved up.
    pub change: Option<i64>,
    pub checked_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct RankedRow {
    keyword: String,
    search_engine: String,
    position: Option<i64>,
    checked_at: DateTime<Utc>,
    rn: i64,
}

impl Ranking {
    pub async fn find_for_location(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
        filter: &RankingFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM rankings
               WHERE user_id = $1 AND location_id = $2 AND ($3 IS NULL OR keyword = $3)
               ORDER BY checked_at DESC"#,
        )
        .bind(user_id)
        .bind(location_id)
        .bind(&filter.keyword)
        .fetch_all(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
        data: &CreateRanking,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO rankings
                   (id, user_id, location_id, keyword, search_engine, position, checked_at, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(location_id)
        .bind(data.keyword.trim().to_lowercase())
        .bind(data.search_engine.as_deref().unwrap_or("google"))
        .bind(data.position)
        .bind(data.checked_at.unwrap_or(now))
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM rankings WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn summary(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
    ) -> Result<Vec<KeywordRanking>, sqlx::Error> {
        let rows = sqlx::query_as::<_, RankedRow>(
            r#"SELECT keyword, search_engine, position, checked_at, rn FROM (
                   SELECT keyword, search_engine, position, checked_at,
                          ROW_NUMBER() OVER (
                              PARTITION BY keyword, search_engine
                              ORDER BY checked_at DESC, created_at DESC
                          ) AS rn
                   FROM rankings
                   WHERE user_id = $1 AND location_id = $2
               )
               WHERE rn <= 2
               ORDER BY keyword ASC, search_engine ASC, rn ASC"#,
        )
        .bind(user_id)
        .bind(location_id)
        .fetch_all(pool)
        .await?;

        let mut summary: Vec<KeywordRanking> = Vec::new();
        for row in rows {
            if row.rn == 1 {
                summary.push(KeywordRanking {
                    keyword: row.keyword,
                    search_engine: row.search_engine,
                    position: row.position,
                    previous_position: None,
                    change: None,
                    checked_at: row.checked_at,
                });
            } else if let Some(latest) = summary.last_mut() {
                latest.previous_position = row.position;
                latest.change = match (row.position, latest.position) {
                    (Some(prev), Some(cur)) => Some(prev - cur),
                    _ => None,
                };
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_utils::{create_test_location, create_test_pool};

    fn observation(keyword: &str, position: Option<i64>, hours_ago: i64) -> CreateRanking {
        CreateRanking {
            keyword: keyword.to_string(),
            search_engine: None,
            position,
            checked_at: Some(Utc::now() - Duration::hours(hours_ago)),
        }
    }

    #[tokio::test]
    async fn test_summary_reports_latest_and_change() {
        let (pool, _dir) = create_test_pool().await;
        let user = Uuid::new_v4();
        let location = create_test_location(&pool, user, "Bakery").await;

        for data in [
            observation("Sourdough", Some(9), 72),
            observation("sourdough", Some(7), 48),
            observation("sourdough", Some(3), 1),
            observation("croissant", None, 2),
        ] {
            Ranking::create(&pool, user, location.id, &data).await.unwrap();
        }

        let summary = Ranking::summary(&pool, user, location.id).await.unwrap();
        assert_eq!(summary.len(), 2);

        let croissant = &summary[0];
        assert_eq!(croissant.keyword, "croissant");
        assert_eq!(croissant.position, None);
        assert_eq!(croissant.change, None);

        let sourdough = &summary[1];
        assert_eq!(sourdough.position, Some(3));
        assert_eq!(sourdough.previous_position, Some(7));
        assert_eq!(sourdough.change, Some(4));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_position() {
        let (pool, _dir) = create_test_pool().await;
        let user = Uuid::new_v4();
        let location = create_test_location(&pool, user, "Bakery").await;

        let result = Ranking::create(&pool, user, location.id, &observation("bread", Some(0), 0)).await;
        assert!(result.is_err());
    }
}
