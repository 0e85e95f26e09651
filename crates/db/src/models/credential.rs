use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

/// OAuth refresh token captured by the Google consent flow.
///
/// The token itself never leaves the backend; API responses use
/// [`CredentialSummary`].
#[derive(Debug, Clone, FromRow)]
pub struct GoogleCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub google_email: Option<String>,
    pub refresh_token: String,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ts_rs::TS)]
pub struct CredentialSummary {
    pub id: Uuid,
    pub google_email: Option<String>,
    pub scope: String,
    pub created_at: DateTime<Utc>,
}

impl From<&GoogleCredential> for CredentialSummary {
    fn from(c: &GoogleCredential) -> Self {
        Self {
            id: c.id,
            google_email: c.google_email.clone(),
            scope: c.scope.clone(),
            created_at: c.created_at,
        }
    }
}

impl GoogleCredential {
    /// Store a refresh token. Re-consenting with the same Google identity
    /// replaces the previous token.
    pub async fn upsert(
        pool: &SqlitePool,
        user_id: Uuid,
        google_email: Option<&str>,
        refresh_token: &str,
        scope: &str,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO google_credentials (id, user_id, google_email, refresh_token, scope, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            ON CONFLICT (user_id, google_email) DO UPDATE SET
                refresh_token = excluded.refresh_token,
                scope = excluded.scope,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(google_email)
        .bind(refresh_token)
        .bind(scope)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM google_credentials WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_all(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM google_credentials WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
