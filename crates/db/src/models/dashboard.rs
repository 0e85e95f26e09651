use serde::Serialize;
use sqlx::SqlitePool;
use ts_rs::TS;
use uuid::Uuid;

use super::{
    citation::{Citation, CitationStats},
    media_item::MediaItem,
    post::{Post, PostStatusCounts},
    review::{Review, ReviewStats},
    sync_job::SyncJob,
};

/// Headline numbers for the landing page
#[derive(Debug, Clone, Serialize, TS)]
pub struct DashboardStats {
    pub accounts: i64,
    pub locations: i64,
    pub reviews: ReviewStats,
    pub posts: PostStatusCounts,
    pub media: i64,
    pub citations: CitationStats,
    pub last_sync: Option<SyncJob>,
}

impl DashboardStats {
    pub async fn load(pool: &SqlitePool, user_id: Uuid) -> Result<Self, sqlx::Error> {
        let accounts: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM google_accounts WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        let locations: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM locations WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(Self {
            accounts,
            locations,
            reviews: Review::stats(pool, user_id, None).await?,
            posts: Post::status_counts(pool, user_id).await?,
            media: MediaItem::count(pool, user_id).await?,
            citations: Citation::stats(pool, user_id).await?,
            last_sync: SyncJob::latest_for_user(pool, user_id).await?,
        })
    }
}
