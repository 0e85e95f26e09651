use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use ts_rs::TS;
use uuid::Uuid;

use crate::UPSERT_CHUNK_SIZE;

/// A Google Business Profile account (`accounts/{id}`) linked by a user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct GoogleAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Google resource name, e.g. `accounts/1234567890`
    pub google_name: String,
    pub account_name: String,
    pub account_type: Option<String>,
    /// Refresh token used to call Google on behalf of this account. When
    /// absent the service account is used.
    pub credential_id: Option<Uuid>,
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateGoogleAccount {
    pub google_name: String,
    pub account_name: String,
    pub account_type: Option<String>,
    pub credential_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateGoogleAccount {
    pub account_name: Option<String>,
    pub credential_id: Option<Uuid>,
}

/// Account row as reported by the Google account management API.
#[derive(Debug, Clone)]
pub struct UpsertGoogleAccount {
    pub google_name: String,
    pub account_name: String,
    pub account_type: Option<String>,
}

impl GoogleAccount {
    pub async fn find_all(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM google_accounts
               WHERE user_id = $1 AND deleted_at IS NULL
               ORDER BY account_name ASC"#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// All live accounts across users, for the background sync loop.
    pub async fn find_all_active(pool: &SqlitePool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM google_accounts
               WHERE deleted_at IS NULL
               ORDER BY last_synced_at ASC NULLS FIRST"#,
        )
        .fetch_all(pool)
        .await
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM google_accounts
               WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL"#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_google_name(
        pool: &SqlitePool,
        user_id: Uuid,
        google_name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"SELECT * FROM google_accounts
               WHERE google_name = $1 AND user_id = $2 AND deleted_at IS NULL"#,
        )
        .bind(google_name)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    pub async fn create(
        pool: &SqlitePool,
        user_id: Uuid,
        data: &CreateGoogleAccount,
    ) -> Result<Self, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Self>(
            r#"INSERT INTO google_accounts
                   (id, user_id, google_name, account_name, account_type, credential_id, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&data.google_name)
        .bind(&data.account_name)
        .bind(&data.account_type)
        .bind(data.credential_id)
        .bind(now)
        .fetch_one(pool)
        .await
    }

    pub async fn update(
        pool: &SqlitePool,
        user_id: Uuid,
        id: Uuid,
        data: &UpdateGoogleAccount,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            r#"UPDATE google_accounts
               SET account_name = COALESCE($3, account_name),
                   credential_id = COALESCE($4, credential_id),
                   updated_at = $5
               WHERE id = $1 AND user_id = $2 AND deleted_at IS NULL
               RETURNING *"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(&data.account_name)
        .bind(data.credential_id)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await
    }

    /// Soft-delete. Returns false when nothing matched.
    pub async fn soft_delete(pool: &SqlitePool, user_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"UPDATE google_accounts
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
        sqlx::query("UPDATE google_accounts SET last_synced_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn upsert_one<'e, E>(
        executor: E,
        user_id: Uuid,
        credential_id: Option<Uuid>,
        row: &UpsertGoogleAccount,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"INSERT INTO google_accounts
                   (id, user_id, google_name, account_name, account_type, credential_id, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
               ON CONFLICT (user_id, google_name) DO UPDATE SET
                   account_name = excluded.account_name,
                   account_type = excluded.account_type,
                   credential_id = COALESCE(excluded.credential_id, google_accounts.credential_id),
                   deleted_at = NULL,
                   updated_at = excluded.updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&row.google_name)
        .bind(&row.account_name)
        .bind(&row.account_type)
        .bind(credential_id)
        .bind(now)
        .execute(executor)
        .await?;
        Ok(result.rows_affected())
    }

    /// Insert-or-update accounts keyed on `(user_id, google_name)`, one
    /// transaction per chunk. Deleted accounts that Google still reports
    /// are revived.
    pub async fn upsert_batch(
        pool: &SqlitePool,
        user_id: Uuid,
        credential_id: Option<Uuid>,
        rows: &[UpsertGoogleAccount],
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now();
        let mut affected = 0;
        for chunk in rows.chunks(UPSERT_CHUNK_SIZE) {
            let mut tx = pool.begin().await?;
            for row in chunk {
                affected += Self::upsert_one(&mut *tx, user_id, credential_id, row, now).await?;
            }
            tx.commit().await?;
        }
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_account, create_test_pool};

    #[tokio::test]
    async fn test_upsert_is_idempotent_and_updates_names() {
        let (pool, _dir) = create_test_pool().await;
        let user = Uuid::new_v4();
        let first = create_test_account(&pool, user, "accounts/1").await;

        let rows = [UpsertGoogleAccount {
            google_name: "accounts/1".into(),
            account_name: "Renamed".into(),
            account_type: Some("ORGANIZATION".into()),
        }];
        GoogleAccount::upsert_batch(&pool, user, None, &rows).await.unwrap();

        let all = GoogleAccount::find_all(&pool, user).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[0].account_name, "Renamed");
    }

    #[tokio::test]
    async fn test_rows_are_scoped_to_owner() {
        let (pool, _dir) = create_test_pool().await;
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let account = create_test_account(&pool, owner, "accounts/2").await;

        assert!(GoogleAccount::find_by_id(&pool, other, account.id).await.unwrap().is_none());
        assert!(!GoogleAccount::soft_delete(&pool, other, account.id).await.unwrap());
        assert!(GoogleAccount::soft_delete(&pool, owner, account.id).await.unwrap());
        assert!(GoogleAccount::find_all(&pool, owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_revives_soft_deleted_account() {
        let (pool, _dir) = create_test_pool().await;
        let user = Uuid::new_v4();
        let account = create_test_account(&pool, user, "accounts/3").await;
        GoogleAccount::soft_delete(&pool, user, account.id).await.unwrap();

        let rows = [UpsertGoogleAccount {
            google_name: "accounts/3".into(),
            account_name: "Back".into(),
            account_type: None,
        }];
        GoogleAccount::upsert_batch(&pool, user, None, &rows).await.unwrap();

        let revived = GoogleAccount::find_by_id(&pool, user, account.id).await.unwrap();
        assert_eq!(revived.map(|a| a.account_name), Some("Back".to_string()));
    }
}
