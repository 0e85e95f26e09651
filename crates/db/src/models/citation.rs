use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CitationError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("a citation for directory '{0}' already exists for this location")]
    DuplicateDirectory(String),
}

fn map_unique_violation(err: sqlx::Error, directory: &str) -> CitationError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        return CitationError::DuplicateDirectory(directory.to_string());
    }
    CitationError::Database(err)
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "nap_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NapStatus {
    #[default]
    Unchecked,
    Consistent,
    Inconsistent,
    Missing,
}

/// A business listing on a third-party directory (Yelp, Bing Places, ...).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Citation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub location_id: Uuid,
    pub directory: String,
    pub listing_url: Option<String>,
    pub listed_name: Option<String>,
    pub listed_address: Option<String>,
    pub listed_phone: Option<String>,
    pub nap_status: NapStatus,
    #[ts(type = "string[]")]
    pub mismatched_fields: Json<Vec<String>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateCitation {
    pub directory: String,
    pub listing_url: Option<String>,
    pub listed_name: Option<String>,
    pub listed_address: Option<String>,
    pub listed_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateCitation {
    pub listing_url: Option<String>,
    pub listed_name: Option<String>,
    pub listed_address: Option<String>,
    pub listed_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, TS, FromRow)]
pub struct CitationStats {
    pub total: i64,
    pub consistent: i64,
    pub inconsistent: i64,
    pub missing: i64,
}

impl Citation {
    pub async fn find_for_location(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM citations
               WHERE user_id = $1 AND location_id = $2
               ORDER BY directory ASC"#,
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
        sqlx::query_as::<_, Self>("SELECT * FROM citations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        location_id: Uuid,
        data: &CreateCitation,
    ) -> Result<Self, CitationError> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO citations
                   (id, user_id, location_id, directory, listing_url, listed_name, listed_address,
                    listed_phone, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(location_id)
        .bind(data.directory.trim())
        .bind(&data.listing_url)
        .bind(&data.listed_name)
        .bind(&data.listed_address)
        .bind(&data.listed_phone)
        .bind(now)
        .fetch_one(pool)
        .await
        .map_err(|e| map_unique_violation(e, &data.directory))
    }

    /// Editing the listed NAP invalidates the previous check result.
    pub async fn update(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
        data: &UpdateCitation,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"UPDATE citations
               SET listing_url = COALESCE($3, listing_url),
                   listed_name = COALESCE($4, listed_name),
                   listed_address = COALESCE($5, listed_address),
                   listed_phone = COALESCE($6, listed_phone),
                   nap_status = 'unchecked',
                   mismatched_fields = '[]',
                   updated_at = $7
               WHERE id = $1 AND user_id = $2
               RETURNING *"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&data.listing_url)
        .bind(&data.listed_name)
        .bind(&data.listed_address)
        .bind(&data.listed_phone)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM citations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn record_check(
        pool: &SqlitePool,
        id: Uuid,
        status: NapStatus,
        mismatched: &[String],
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"UPDATE citations
               SET nap_status = $2, mismatched_fields = $3, last_checked_at = $4, updated_at = $4
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(status)
        .bind(Json(mismatched))
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn stats(pool: &SqlitePool, user_id: Uuid) -> Result<CitationStats, sqlx::Error> {
        sqlx::query_as::<_, CitationStats>(
            r#"SELECT
                   COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN c.nap_status = 'consistent' THEN 1 ELSE 0 END), 0) AS consistent,
                   COALESCE(SUM(CASE WHEN c.nap_status = 'inconsistent' THEN 1 ELSE 0 END), 0) AS inconsistent,
                   COALESCE(SUM(CASE WHEN c.nap_status = 'missing' THEN 1 ELSE 0 END), 0) AS missing
               FROM citations c
               JOIN locations l ON l.id = c.location_id
               WHERE c.user_id = $1 AND l.deleted_at IS NULL"#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }
}
