//! Google Business Profile to database sync.
//!
//! Every run walks Google's pages one at a time and upserts each page
//! before asking for the next. Runs are recorded as [`SyncJob`] rows.

use std::{collections::HashMap, future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use db::{
    DBService, RetryConfig,
    models::{
        account::{GoogleAccount, UpsertGoogleAccount},
        credential::GoogleCredential,
        location::{Location, UpsertLocation},
        media_item::{MediaItem, UpsertMediaItem},
        post::{Post, PostStatus, UpsertPost},
        review::{Review, UpsertReview},
        sync_job::{SyncJob, SyncJobType},
    },
    with_retry,
};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tokio::{sync::Mutex, task::JoinHandle, time::interval};
use tracing::{debug, error, info, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::services::google::{
    GoogleApi, GoogleError, NewLocalPost, PageCursor, TokenSource,
    auth::{CachedTokenSource, GoogleOAuthClient},
    v4_location_name,
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Google(#[from] GoogleError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("no Google credentials available: {0}")]
    NoCredentials(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("location `{0}` is not linked to a Google account")]
    NotLinked(String),
    #[error("post cannot be published: {0}")]
    InvalidPost(String),
}

/// What `POST /sync/accounts/{id}` pulls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum AccountSyncScope {
    #[default]
    Locations,
    Full,
}

/// What `POST /sync/locations/{id}` pulls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum LocationSyncScope {
    Reviews,
    Media,
    Posts,
    #[default]
    All,
}

impl LocationSyncScope {
    fn job_type(self) -> SyncJobType {
        match self {
            Self::Reviews => SyncJobType::Reviews,
            Self::Media => SyncJobType::Media,
            Self::Posts => SyncJobType::Posts,
            Self::All => SyncJobType::Full,
        }
    }
}

/// Picks the Google token for an account: the user's OAuth credential when
/// the account has one, the service account otherwise.
pub struct TokenResolver {
    service_account: Option<Arc<dyn TokenSource>>,
    oauth: Option<GoogleOAuthClient>,
    /// Keyed by `(user_id, credential_id)`; an entry exists only after the
    /// owner-scoped lookup succeeded for that user.
    per_credential: Mutex<HashMap<(Uuid, Uuid), Arc<dyn TokenSource>>>,
}

impl TokenResolver {
    pub fn new(
        service_account: Option<Arc<dyn TokenSource>>,
        oauth: Option<GoogleOAuthClient>,
    ) -> Self {
        Self {
            service_account,
            oauth,
            per_credential: Mutex::new(HashMap::new()),
        }
    }

    pub fn oauth(&self) -> Option<&GoogleOAuthClient> {
        self.oauth.as_ref()
    }

    /// Drop the cached source after the credential's refresh token changed.
    pub async fn forget(&self, credential_id: Uuid) {
        self.per_credential
            .lock()
            .await
            .retain(|(_, cached), _| *cached != credential_id);
    }

    pub async fn resolve(
        &self,
        db: &DBService,
        user_id: Uuid,
        credential_id: Option<Uuid>,
    ) -> Result<Arc<dyn TokenSource>, SyncError> {
        let Some(credential_id) = credential_id else {
            return self.service_account.clone().ok_or_else(|| {
                SyncError::NoCredentials(
                    "no service account configured and no Google credential linked".to_string(),
                )
            });
        };

        let mut cache = self.per_credential.lock().await;
        if let Some(source) = cache.get(&(user_id, credential_id)) {
            return Ok(source.clone());
        }

        let credential = GoogleCredential::find_by_id(&db.pool, user_id, credential_id)
            .await?
            .ok_or(SyncError::NotFound("credential"))?;
        let oauth = self.oauth.as_ref().ok_or_else(|| {
            SyncError::NoCredentials("Google OAuth client is not configured".to_string())
        })?;

        let refresh = oauth.refresh_source(SecretString::from(credential.refresh_token));
        let source: Arc<dyn TokenSource> = Arc::new(CachedTokenSource::new(Arc::new(refresh)));
        cache.insert((user_id, credential_id), source.clone());
        Ok(source)
    }
}

pub struct GmbSyncService {
    db: DBService,
    google: Arc<dyn GoogleApi>,
    tokens: Arc<TokenResolver>,
    db_retry: RetryConfig,
}

impl GmbSyncService {
    pub fn new(db: DBService, google: Arc<dyn GoogleApi>, tokens: Arc<TokenResolver>) -> Self {
        Self {
            db,
            google,
            tokens,
            db_retry: RetryConfig::default(),
        }
    }

    pub fn tokens(&self) -> &TokenResolver {
        &self.tokens
    }

    /// Discover the accounts a credential (or the service account) can
    /// manage and store them for `user_id`.
    pub async fn sync_accounts(
        &self,
        user_id: Uuid,
        credential_id: Option<Uuid>,
    ) -> Result<SyncJob, SyncError> {
        let job = SyncJob::start(&self.db.pool, user_id, SyncJobType::Accounts, None, None).await?;
        let mut items = 0;
        let result = self.pull_accounts(user_id, credential_id, &mut items).await;
        self.finish(job, items, result).await
    }

    pub async fn sync_locations(
        &self,
        user_id: Uuid,
        account: &GoogleAccount,
    ) -> Result<SyncJob, SyncError> {
        let job = SyncJob::start(
            &self.db.pool,
            user_id,
            SyncJobType::Locations,
            Some(account.id),
            None,
        )
        .await?;
        let mut items = 0;
        let result = self.pull_locations(user_id, account, &mut items).await;
        self.finish(job, items, result).await
    }

    pub async fn sync_reviews(&self, user_id: Uuid, location: &Location) -> Result<SyncJob, SyncError> {
        self.sync_location(user_id, location, LocationSyncScope::Reviews).await
    }

    pub async fn sync_media(&self, user_id: Uuid, location: &Location) -> Result<SyncJob, SyncError> {
        self.sync_location(user_id, location, LocationSyncScope::Media).await
    }

    pub async fn sync_posts(&self, user_id: Uuid, location: &Location) -> Result<SyncJob, SyncError> {
        self.sync_location(user_id, location, LocationSyncScope::Posts).await
    }

    /// Pull the children of one location as a single job.
    pub async fn sync_location(
        &self,
        user_id: Uuid,
        location: &Location,
        scope: LocationSyncScope,
    ) -> Result<SyncJob, SyncError> {
        let job = SyncJob::start(
            &self.db.pool,
            user_id,
            scope.job_type(),
            location.account_id,
            Some(location.id),
        )
        .await?;
        let mut items = 0;
        let result = self.pull_location(user_id, location, scope, &mut items).await;
        self.finish(job, items, result).await
    }

    /// Locations first, then reviews, media and posts for each of them. A
    /// failing location is logged and counted; the rest still sync.
    pub async fn sync_full(&self, user_id: Uuid, account: &GoogleAccount) -> Result<SyncJob, SyncError> {
        let job = SyncJob::start(&self.db.pool, user_id, SyncJobType::Full, Some(account.id), None)
            .await?;
        let mut items = 0;
        if let Err(e) = self.pull_locations(user_id, account, &mut items).await {
            return self.finish(job, items, Err(e)).await;
        }

        let locations = match Location::find_synced_for_account(&self.db.pool, user_id, account.id).await {
            Ok(locations) => locations,
            Err(e) => return self.finish(job, items, Err(e.into())).await,
        };

        let mut failed = 0usize;
        for location in &locations {
            if let Err(e) = self
                .pull_location(user_id, location, LocationSyncScope::All, &mut items)
                .await
            {
                failed += 1;
                warn!(
                    account_id = %account.id,
                    location_id = %location.id,
                    error = %e,
                    "Location sync failed, continuing with the rest"
                );
            }
        }

        let job = if failed == 0 {
            SyncJob::finish_success(&self.db.pool, job.id, items).await?
        } else {
            let note = format!("{failed} of {} locations failed to sync", locations.len());
            SyncJob::finish_partial(&self.db.pool, job.id, items, &note).await?
        };
        info!(
            account_id = %account.id,
            locations = locations.len(),
            failed,
            items,
            duration_ms = job.duration_ms,
            "Full account sync finished"
        );
        Ok(job)
    }

    /// Send a draft, scheduled or failed post to Google. The row ends up
    /// `published`, or `failed` with Google's error.
    pub async fn publish_post(&self, user_id: Uuid, post_id: Uuid) -> Result<Post, SyncError> {
        let post = Post::find_by_id(&self.db.pool, user_id, post_id)
            .await?
            .ok_or(SyncError::NotFound("post"))?;
        if post.status == PostStatus::Published {
            return Err(SyncError::InvalidPost("post is already published".to_string()));
        }
        if post.summary.trim().is_empty() {
            return Err(SyncError::InvalidPost("summary is empty".to_string()));
        }

        let location = Location::find_by_id(&self.db.pool, user_id, post.location_id)
            .await?
            .ok_or(SyncError::NotFound("location"))?;
        let (account, parent) = self.google_parent(user_id, &location).await?;
        let auth = self.tokens.resolve(&self.db, user_id, account.credential_id).await?;

        match self
            .google
            .create_local_post(auth.as_ref(), &parent, &NewLocalPost::from_post(&post))
            .await
        {
            Ok(created) => {
                info!(post_id = %post.id, google_name = %created.name, "Published local post");
                Ok(Post::mark_published(&self.db.pool, post.id, &created.name).await?)
            }
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "Publishing local post failed");
                Post::mark_failed(&self.db.pool, post.id, &e.to_string()).await?;
                Err(e.into())
            }
        }
    }

    /// Reply on Google first, then store the reply.
    pub async fn reply_to_review(
        &self,
        user_id: Uuid,
        review_id: Uuid,
        comment: &str,
    ) -> Result<Review, SyncError> {
        let review = Review::find_by_id(&self.db.pool, user_id, review_id)
            .await?
            .ok_or(SyncError::NotFound("review"))?;
        let auth = self.auth_for_location(user_id, review.location_id).await?;
        self.google
            .reply_to_review(auth.as_ref(), &review.google_name, comment)
            .await?;
        Review::set_reply(&self.db.pool, user_id, review.id, comment)
            .await?
            .ok_or(SyncError::NotFound("review"))
    }

    pub async fn delete_review_reply(&self, user_id: Uuid, review_id: Uuid) -> Result<Review, SyncError> {
        let review = Review::find_by_id(&self.db.pool, user_id, review_id)
            .await?
            .ok_or(SyncError::NotFound("review"))?;
        let auth = self.auth_for_location(user_id, review.location_id).await?;
        self.google
            .delete_review_reply(auth.as_ref(), &review.google_name)
            .await?;
        Review::clear_reply(&self.db.pool, user_id, review.id)
            .await?
            .ok_or(SyncError::NotFound("review"))
    }

    /// Publish every scheduled post whose time has come. Returns how many
    /// made it to Google.
    pub async fn publish_due_posts(&self) -> Result<usize, SyncError> {
        let due = Post::find_due_scheduled(&self.db.pool, Utc::now()).await?;
        if due.is_empty() {
            debug!("No scheduled posts due");
            return Ok(0);
        }

        let mut published = 0;
        for post in due {
            match self.publish_post(post.user_id, post.id).await {
                Ok(_) => published += 1,
                Err(e) => warn!(post_id = %post.id, "Scheduled post not published: {}", e),
            }
        }
        Ok(published)
    }

    /// Full sync of every linked account, across all users.
    pub async fn sync_all_accounts(&self) -> Result<(), SyncError> {
        let accounts = GoogleAccount::find_all_active(&self.db.pool).await?;
        if accounts.is_empty() {
            debug!("No Google accounts to sync");
            return Ok(());
        }

        info!("Syncing {} Google accounts", accounts.len());
        for account in accounts {
            if let Err(e) = self.sync_full(account.user_id, &account).await {
                warn!(
                    account_id = %account.id,
                    google_name = %account.google_name,
                    "Error syncing account: {}",
                    e
                );
            }
        }
        Ok(())
    }

    /// Closes jobs a previous process left `running`.
    pub async fn close_abandoned_jobs(&self) -> Result<u64, SyncError> {
        let closed = SyncJob::fail_abandoned(&self.db.pool).await?;
        if closed > 0 {
            warn!("Marked {} interrupted sync jobs as failed", closed);
        }
        Ok(closed)
    }

    /// Background loop: sync every account and publish due posts once per
    /// `poll_interval`.
    pub fn spawn_periodic(self: Arc<Self>, poll_interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting GMB sync service with interval {:?}", poll_interval);

            // The first tick completes immediately.
            let mut ticker = interval(poll_interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sync_all_accounts().await {
                    error!("Error during periodic GMB sync: {}", e);
                }
                if let Err(e) = self.publish_due_posts().await {
                    error!("Error publishing scheduled posts: {}", e);
                }
            }
        })
    }

    async fn finish(
        &self,
        job: SyncJob,
        items: u64,
        result: Result<(), SyncError>,
    ) -> Result<SyncJob, SyncError> {
        match result {
            Ok(()) => {
                let job = SyncJob::finish_success(&self.db.pool, job.id, items).await?;
                info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    items,
                    duration_ms = job.duration_ms,
                    "Sync job succeeded"
                );
                Ok(job)
            }
            Err(e) => {
                error!(job_id = %job.id, job_type = %job.job_type, items, error = %e, "Sync job failed");
                if let Err(db_err) =
                    SyncJob::finish_failure(&self.db.pool, job.id, items, &e.to_string()).await
                {
                    error!(job_id = %job.id, "Failed to record sync job failure: {}", db_err);
                }
                Err(e)
            }
        }
    }

    /// Upsert a page of rows, retrying transient SQLite errors.
    async fn write<F, Fut>(&self, operation: &str, op: F) -> Result<u64, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<u64, sqlx::Error>>,
    {
        Ok(with_retry(&self.db_retry, operation, op).await?)
    }

    async fn pull_accounts(
        &self,
        user_id: Uuid,
        credential_id: Option<Uuid>,
        items: &mut u64,
    ) -> Result<(), SyncError> {
        let auth = self.tokens.resolve(&self.db, user_id, credential_id).await?;
        let pool = &self.db.pool;
        let mut cursor = PageCursor::new();
        loop {
            let page = self.google.list_accounts(auth.as_ref(), cursor.token()).await?;
            let rows: Vec<UpsertGoogleAccount> = page.items.iter().map(Into::into).collect();
            let rows = &rows;
            *items += self
                .write("upsert_accounts", move || async move {
                    GoogleAccount::upsert_batch(pool, user_id, credential_id, rows).await
                })
                .await?;
            debug!(page = cursor.pages() + 1, count = rows.len(), "Upserted account page");
            if !cursor.advance(page.next_page_token)? {
                return Ok(());
            }
        }
    }

    async fn pull_locations(
        &self,
        user_id: Uuid,
        account: &GoogleAccount,
        items: &mut u64,
    ) -> Result<(), SyncError> {
        let auth = self.tokens.resolve(&self.db, user_id, account.credential_id).await?;
        let pool = &self.db.pool;
        let account_id = account.id;
        let mut cursor = PageCursor::new();
        loop {
            let page = self
                .google
                .list_locations(auth.as_ref(), &account.google_name, cursor.token())
                .await?;
            let rows: Vec<UpsertLocation> = page.items.iter().map(|l| l.to_upsert()).collect();
            let rows = &rows;
            *items += self
                .write("upsert_locations", move || async move {
                    Location::upsert_batch(pool, user_id, account_id, rows).await
                })
                .await?;
            debug!(
                account_id = %account.id,
                page = cursor.pages() + 1,
                count = rows.len(),
                "Upserted location page"
            );
            if !cursor.advance(page.next_page_token)? {
                break;
            }
        }
        GoogleAccount::mark_synced(pool, account.id).await?;
        Ok(())
    }

    async fn pull_location(
        &self,
        user_id: Uuid,
        location: &Location,
        scope: LocationSyncScope,
        items: &mut u64,
    ) -> Result<(), SyncError> {
        let (account, parent) = self.google_parent(user_id, location).await?;
        let auth = self.tokens.resolve(&self.db, user_id, account.credential_id).await?;
        let auth = auth.as_ref();

        if matches!(scope, LocationSyncScope::Reviews | LocationSyncScope::All) {
            self.pull_reviews(auth, user_id, location.id, &parent, items).await?;
        }
        if matches!(scope, LocationSyncScope::Media | LocationSyncScope::All) {
            self.pull_media(auth, user_id, location.id, &parent, items).await?;
        }
        if matches!(scope, LocationSyncScope::Posts | LocationSyncScope::All) {
            self.pull_posts(auth, user_id, location.id, &parent, items).await?;
        }
        Location::mark_synced(&self.db.pool, location.id).await?;
        Ok(())
    }

    async fn pull_reviews(
        &self,
        auth: &dyn TokenSource,
        user_id: Uuid,
        location_id: Uuid,
        parent: &str,
        items: &mut u64,
    ) -> Result<(), SyncError> {
        let pool = &self.db.pool;
        let mut cursor = PageCursor::new();
        loop {
            let page = self.google.list_reviews(auth, parent, cursor.token()).await?;
            let rows: Vec<UpsertReview> = page
                .items
                .iter()
                .filter_map(|r| r.to_upsert(location_id))
                .collect();
            let skipped = page.items.len() - rows.len();
            if skipped > 0 {
                debug!(%location_id, skipped, "Skipped reviews without a star rating");
            }
            let rows = &rows;
            *items += self
                .write("upsert_reviews", move || async move {
                    Review::upsert_batch(pool, user_id, rows).await
                })
                .await?;
            if !cursor.advance(page.next_page_token)? {
                return Ok(());
            }
        }
    }

    async fn pull_media(
        &self,
        auth: &dyn TokenSource,
        user_id: Uuid,
        location_id: Uuid,
        parent: &str,
        items: &mut u64,
    ) -> Result<(), SyncError> {
        let pool = &self.db.pool;
        let mut cursor = PageCursor::new();
        loop {
            let page = self.google.list_media(auth, parent, cursor.token()).await?;
            let rows: Vec<UpsertMediaItem> =
                page.items.iter().map(|m| m.to_upsert(location_id)).collect();
            let rows = &rows;
            *items += self
                .write("upsert_media", move || async move {
                    MediaItem::upsert_batch(pool, user_id, rows).await
                })
                .await?;
            if !cursor.advance(page.next_page_token)? {
                return Ok(());
            }
        }
    }

    async fn pull_posts(
        &self,
        auth: &dyn TokenSource,
        user_id: Uuid,
        location_id: Uuid,
        parent: &str,
        items: &mut u64,
    ) -> Result<(), SyncError> {
        let pool = &self.db.pool;
        let mut cursor = PageCursor::new();
        loop {
            let page = self.google.list_local_posts(auth, parent, cursor.token()).await?;
            let rows: Vec<UpsertPost> =
                page.items.iter().map(|p| p.to_upsert(location_id)).collect();
            let rows = &rows;
            *items += self
                .write("upsert_posts", move || async move {
                    Post::upsert_batch(pool, user_id, rows).await
                })
                .await?;
            if !cursor.advance(page.next_page_token)? {
                return Ok(());
            }
        }
    }

    /// Account and v4 parent name (`accounts/{a}/locations/{l}`) of a
    /// synced location.
    async fn google_parent(
        &self,
        user_id: Uuid,
        location: &Location,
    ) -> Result<(GoogleAccount, String), SyncError> {
        let (Some(account_id), Some(google_name)) = (location.account_id, location.google_name.as_deref())
        else {
            return Err(SyncError::NotLinked(location.title.clone()));
        };
        let account = GoogleAccount::find_by_id(&self.db.pool, user_id, account_id)
            .await?
            .ok_or(SyncError::NotFound("account"))?;
        let parent = v4_location_name(&account.google_name, google_name);
        Ok((account, parent))
    }

    async fn auth_for_location(
        &self,
        user_id: Uuid,
        location_id: Uuid,
    ) -> Result<Arc<dyn TokenSource>, SyncError> {
        let location = Location::find_by_id(&self.db.pool, user_id, location_id)
            .await?
            .ok_or(SyncError::NotFound("location"))?;
        let (account, _) = self.google_parent(user_id, &location).await?;
        self.tokens.resolve(&self.db, user_id, account.credential_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_maps_to_job_type() {
        assert_eq!(LocationSyncScope::Reviews.job_type(), SyncJobType::Reviews);
        assert_eq!(LocationSyncScope::All.job_type(), SyncJobType::Full);
        assert_eq!(LocationSyncScope::default(), LocationSyncScope::All);
        assert_eq!(AccountSyncScope::default(), AccountSyncScope::Locations);
    }

    #[test]
    fn test_scope_parses_from_query_value() {
        let scope: LocationSyncScope = serde_json::from_str("\"media\"").unwrap();
        assert_eq!(scope, LocationSyncScope::Media);
        let scope: AccountSyncScope = serde_json::from_str("\"full\"").unwrap();
        assert_eq!(scope, AccountSyncScope::Full);
    }
}
