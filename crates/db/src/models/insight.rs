use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use crate::UPSERT_CHUNK_SIZE;

/// Daily value of a performance metric (e.g. `WEBSITE_CLICKS`).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Insight {
    pub id: Uuid,
    pub user_id: Uuid,
    pub location_id: Uuid,
    pub metric: String,
    pub metric_date: NaiveDate,
    pub value: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct InsightPoint {
    pub metric: String,
    pub metric_date: NaiveDate,
    pub value: i64,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct InsightFilter {
    pub metric: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, TS, FromRow)]
pub struct MetricTotal {
    pub metric: String,
    pub total: i64,
    pub days: i64,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
}

impl Insight {
    /// Points in `[from, to]`, both bounds inclusive and optional.
    pub async fn find_for_location(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
        filter: &InsightFilter,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM insights
               WHERE user_id = $1
                 AND location_id = $2
                 AND ($3 IS NULL OR metric = $3)
                 AND ($4 IS NULL OR metric_date >= $4)
                 AND ($5 IS NULL OR metric_date <= $5)
               ORDER BY metric ASC, metric_date ASC"#,
        )
        .bind(user_id)
        .bind(location_id)
        .bind(&filter.metric)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(pool)
        .await
    }

    pub async fn summary(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
        filter: &InsightFilter,
    ) -> Result<Vec<MetricTotal>, sqlx::Error> {
        sqlx::query_as::<_, MetricTotal>(
            r#"SELECT metric,
                      SUM(value) AS total,
                      COUNT(*) AS days,
                      MIN(metric_date) AS first_date,
                      MAX(metric_date) AS last_date
               FROM insights
               WHERE user_id = $1
                 AND location_id = $2
                 AND ($3 IS NULL OR metric = $3)
                 AND ($4 IS NULL OR metric_date >= $4)
                 AND ($5 IS NULL OR metric_date <= $5)
               GROUP BY metric
               ORDER BY metric ASC"#,
        )
        .bind(user_id)
        .bind(location_id)
        .bind(&filter.metric)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_all(pool)
        .await
    }

    async fn upsert_one<'e, E>(
        executor: E,
        user_id: Uuid,
        location_id: Uuid,
        point: &InsightPoint,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"INSERT INTO insights (id, user_id, location_id, metric, metric_date, value, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
               ON CONFLICT (location_id, metric, metric_date) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(location_id)
        .bind(point.metric.trim().to_uppercase())
        .bind(point.metric_date)
        .bind(point.value)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Record daily values; an existing `(location, metric, date)` value is
    /// replaced. The caller must have checked that the location belongs to
    /// `user_id`.
    pub async fn upsert_batch(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
        points: &[InsightPoint],
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let mut affected = 0;
        for chunk in points.chunks(UPSERT_CHUNK_SIZE) {
            let mut tx = pool.begin().await?;
            for point in chunk {
                affected += Self::upsert_one(&mut *tx, user_id, location_id, point, now).await?;
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

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, d).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_summary_sums_range() {
        let (pool, _dir) = create_test_pool().await;
        let user = Uuid::new_v4();
        let location = create_test_location(&pool, user, "Bakery").await;

        let points: Vec<InsightPoint> = (1..=10)
            .map(|d| InsightPoint {
                metric: "website_clicks".into(),
                metric_date: day(d),
                value: 10,
            })
            .collect();
        Insight::upsert_batch(&pool, user, location.id, &points).await.unwrap();

        let correction = [InsightPoint {
            metric: "WEBSITE_CLICKS".into(),
            metric_date: day(5),
            value: 50,
        }];
        Insight::upsert_batch(&pool, user, location.id, &correction).await.unwrap();

        let filter = InsightFilter {
            metric: None,
            from: Some(day(4)),
            to: Some(day(6)),
        };
        let rows = Insight::find_for_location(&pool, user, location.id, &filter).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].value, 50);

        let totals = Insight::summary(&pool, user, location.id, &filter).await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].metric, "WEBSITE_CLICKS");
        assert_eq!(totals[0].total, 70);
        assert_eq!(totals[0].days, 3);
        assert_eq!(totals[0].first_date, day(4));
    }
}
