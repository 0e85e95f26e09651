//! Test utilities for database tests.
//!
//! Each test gets its own SQLite file in a temp dir with migrations applied.

use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tempfile::TempDir;
use uuid::Uuid;

use crate::models::{
    account::{GoogleAccount, UpsertGoogleAccount},
    location::{CreateLocation, Location},
};

/// Create a test database pool with migrations applied.
///
/// Returns the pool and a TempDir that must be kept alive for the duration of the test.
pub async fn create_test_pool() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create test temp dir");
    let db_path = temp_dir.path().join("test.db");

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
        .expect("Invalid test database URL")
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("Failed to create test pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    (pool, temp_dir)
}

/// Insert a Google account owned by `user_id`.
pub async fn create_test_account(pool: &SqlitePool, user_id: Uuid, google_name: &str) -> GoogleAccount {
    let rows = [UpsertGoogleAccount {
        google_name: google_name.to_string(),
        account_name: format!("Account {google_name}"),
        account_type: Some("PERSONAL".to_string()),
    }];
    GoogleAccount::upsert_batch(pool, user_id, None, &rows)
        .await
        .expect("Failed to upsert test account");
    GoogleAccount::find_by_google_name(pool, user_id, google_name)
        .await
        .expect("Failed to load test account")
        .expect("Test account missing")
}

/// Insert a manually created location owned by `user_id`.
pub async fn create_test_location(pool: &SqlitePool, user_id: Uuid, title: &str) -> Location {
    let data = CreateLocation {
        account_id: None,
        title: title.to_string(),
        address: Some("123 Main Street".to_string()),
        locality: Some("Springfield".to_string()),
        region: Some("IL".to_string()),
        postal_code: Some("62701".to_string()),
        country_code: Some("US".to_string()),
        phone: Some("(217) 555-0100".to_string()),
        website_uri: Some("https://example.com".to_string()),
        primary_category: Some("Bakery".to_string()),
    };
    Location::create(pool, user_id, &data)
        .await
        .expect("Failed to create test location")
}
