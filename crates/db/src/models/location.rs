use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use crate::UPSERT_CHUNK_SIZE;

/// A business location, either synced from Google or entered by hand.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Location {
    pub id: Uuid,
    pub user_id: Uuid,
    pub account_id: Option<Uuid>,
    /// `locations/{id}` as returned by the Business Information API
    pub google_name: Option<String>,
    pub title: String,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
    pub website_uri: Option<String>,
    pub primary_category: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub maps_uri: Option<String>,
    pub place_id: Option<String>,
    /// Last payload received from Google, kept for fields we don't model.
    #[serde(skip)]
    #[ts(skip)]
    pub raw: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    /// Single-line postal address used for NAP comparison.
    pub fn full_address(&self) -> String {
        [
            self.address.as_deref(),
            self.locality.as_deref(),
            self.region.as_deref(),
            self.postal_code.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(", ")
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateLocation {
    pub account_id: Option<Uuid>,
    pub title: String,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
    pub website_uri: Option<String>,
    pub primary_category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateLocation {
    pub title: Option<String>,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
    pub website_uri: Option<String>,
    pub primary_category: Option<String>,
}

/// Location row produced by the sync from a Google payload.
#[derive(Debug, Clone, Default)]
pub struct UpsertLocation {
    pub google_name: String,
    pub title: String,
    pub address: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country_code: Option<String>,
    pub phone: Option<String>,
    pub website_uri: Option<String>,
    pub primary_category: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub maps_uri: Option<String>,
    pub place_id: Option<String>,
    pub raw: Option<String>,
}

impl Location {
    pub async fn find_all(
        pool: &SqlitePool,
        user_id: Uuid,
        account_id: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM locations
               WHERE user_id = $1
                 AND deleted_at IS NULL
                 AND ($2 IS NULL OR account_id = $2)
               ORDER BY title ASC"#,
        )
        .bind(user_id)
        .bind(account_id)
        .fetch_all(pool)
        .await
    }

    /// Synced locations of an account, i.e. the ones Google knows about.
    pub async fn find_synced_for_account(
        pool: &SqlitePool,
        user_id: Uuid,
        account_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM locations
               WHERE user_id = $1
                 AND account_id = $2
                 AND google_name IS NOT NULL
                 AND deleted_at IS NULL
               ORDER BY title ASC"#,
        )
        .bind(user_id)
        .bind(account_id)
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM locations WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        data: &CreateLocation,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO locations
                   (id, user_id, account_id, title, address, locality, region, postal_code,
                    country_code, phone, website_uri, primary_category, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(data.account_id)
        .bind(&data.title)
        .bind(&data.address)
        .bind(&data.locality)
        .bind(&data.region)
        .bind(&data.postal_code)
        .bind(&data.country_code)
        .bind(&data.phone)
        .bind(&data.website_uri)
        .bind(&data.primary_category)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
        data: &UpdateLocation,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"UPDATE locations
               SET title = COALESCE($3, title),
                   address = COALESCE($4, address),
                   locality = COALESCE($5, locality),
                   region = COALESCE($6, region),
                   postal_code = COALESCE($7, postal_code),
                   country_code = COALESCE($8, country_code),
                   phone = COALESCE($9, phone),
                   website_uri = COALESCE($10, website_uri),
                   primary_category = COALESCE($11, primary_category),
                   updated_at = $12
               WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
               RETURNING *"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&data.title)
        .bind(&data.address)
        .bind(&data.locality)
        .bind(&data.region)
        .bind(&data.postal_code)
        .bind(&data.country_code)
        .bind(&data.phone)
        .bind(&data.website_uri)
        .bind(&data.primary_category)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    pub async fn soft_delete(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE locations
               SET deleted_at = $3, updated_at = $3
               WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_synced(pool: &SqlitePool, id: Uuid) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query("UPDATE locations SET last_synced_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn upsert_one<'e, E>(
        executor: E,
        user_id: Uuid,
        account_id: Uuid,
        row: &UpsertLocation,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"INSERT INTO locations
                   (id, user_id, account_id, google_name, title, address, locality, region,
                    postal_code, country_code, phone, website_uri, primary_category, latitude,
                    longitude, maps_uri, place_id, raw, last_synced_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $19, $19)
               ON CONFLICT (user_id, google_name) DO UPDATE SET
                   account_id = excluded.account_id,
                   title = excluded.title,
                   address = excluded.address,
                   locality = excluded.locality,
                   region = excluded.region,
                   postal_code = excluded.postal_code,
                   country_code = excluded.country_code,
                   phone = excluded.phone,
                   website_uri = excluded.website_uri,
                   primary_category = excluded.primary_category,
                   latitude = excluded.latitude,
                   longitude = excluded.longitude,
                   maps_uri = excluded.maps_uri,
                   place_id = excluded.place_id,
                   raw = excluded.raw,
                   last_synced_at = excluded.last_synced_at,
                   deleted_at = NULL,
                   updated_at = excluded.updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(account_id)
        .bind(&row.google_name)
        .bind(&row.title)
        .bind(&row.address)
        .bind(&row.locality)
        .bind(&row.region)
        .bind(&row.postal_code)
        .bind(&row.country_code)
        .bind(&row.phone)
        .bind(&row.website_uri)
        .bind(&row.primary_category)
        .bind(row.latitude)
        .bind(row.longitude)
        .bind(&row.maps_uri)
        .bind(&row.place_id)
        .bind(&row.raw)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert-or-update locations keyed on `(user_id, google_name)`, one
    /// transaction per chunk. Last write wins.
    pub async fn upsert_batch(
        pool: &SqlitePool,
        user_id: Uuid,
        account_id: Uuid,
        rows: &[UpsertLocation],
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let mut affected = 0;
        for chunk in rows.chunks(UPSERT_CHUNK_SIZE) {
            let mut tx = pool.begin().await?;
            for row in chunk {
                affected += Self::upsert_one(&mut *tx, user_id, account_id, row, now).await?;
            }
            tx.commit().await?;
        }
        Ok(affected)
    }
}
