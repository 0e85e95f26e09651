//! Client for the Google Business Profile REST APIs.
//!
//! Accounts come from the Account Management API, locations from the
//! Business Information API, and reviews, media and local posts from the
//! v4 `mybusiness` API. Every call is authenticated through a
//! [`TokenSource`] and retried on transient failures.

pub mod auth;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::{Deserialize, de::DeserializeOwned};
use thiserror::Error;
use utils::retry::{RetryPolicy, retry_async};

pub use auth::{AccessToken, TokenSource};
pub use types::*;

#[derive(Debug, Clone, Error)]
pub enum GoogleError {
    #[error("request to Google timed out")]
    Timeout,
    #[error("could not connect to Google: {0}")]
    Connect(String),
    #[error("request to Google failed: {0}")]
    Transport(String),
    #[error("Google API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("failed to decode Google response: {0}")]
    Decode(String),
    #[error("Google authentication failed: {0}")]
    Auth(String),
    #[error("Google client misconfigured: {0}")]
    Config(String),
    #[error("pagination stopped: {0}")]
    Pagination(String),
}

impl GoogleError {
    /// Timeouts, connection failures, 429 and 5xx are worth retrying; any
    /// other response is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Upper bound on pages walked in one listing.
pub const MAX_PAGES: usize = 1000;

/// Tracks the page token between list calls and guards against tokens that
/// never run out.
#[derive(Debug, Default)]
pub struct PageCursor {
    token: Option<String>,
    pages: usize,
}

impl PageCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token for the next request; `None` on the first page.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Record a fetched page. Returns `Ok(true)` while more pages remain.
    pub fn advance(&mut self, next_page_token: Option<String>) -> Result<bool, GoogleError> {
        self.pages += 1;
        let next = next_page_token.filter(|t| !t.is_empty());
        match next {
            None => Ok(false),
            Some(next) if self.token.as_deref() == Some(next.as_str()) => Err(
                GoogleError::Pagination(format!("page token `{next}` repeated")),
            ),
            Some(_) if self.pages >= MAX_PAGES => Err(GoogleError::Pagination(format!(
                "more than {MAX_PAGES} pages"
            ))),
            Some(next) => {
                self.token = Some(next);
                Ok(true)
            }
        }
    }
}

/// Operations the sync and route layers need from Google.
#[async_trait]
pub trait GoogleApi: Send + Sync {
    async fn list_accounts(
        &self,
        auth: &dyn TokenSource,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleAccount>, GoogleError>;

    /// `account` is `accounts/{id}`.
    async fn list_locations(
        &self,
        auth: &dyn TokenSource,
        account: &str,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleLocation>, GoogleError>;

    /// `location` is the v4 parent `accounts/{a}/locations/{l}`.
    async fn list_reviews(
        &self,
        auth: &dyn TokenSource,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleReview>, GoogleError>;

    async fn list_media(
        &self,
        auth: &dyn TokenSource,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleMediaItem>, GoogleError>;

    async fn list_local_posts(
        &self,
        auth: &dyn TokenSource,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleLocalPost>, GoogleError>;

    async fn reply_to_review(
        &self,
        auth: &dyn TokenSource,
        review_name: &str,
        comment: &str,
    ) -> Result<ReviewReply, GoogleError>;

    async fn delete_review_reply(
        &self,
        auth: &dyn TokenSource,
        review_name: &str,
    ) -> Result<(), GoogleError>;

    async fn create_local_post(
        &self,
        auth: &dyn TokenSource,
        location: &str,
        post: &NewLocalPost,
    ) -> Result<GoogleLocalPost, GoogleError>;
}

/// v4 parent name for a location: `accounts/{a}/locations/{l}`.
pub fn v4_location_name(account: &str, location: &str) -> String {
    let location_id = location.rsplit('/').next().unwrap_or(location);
    format!("{account}/locations/{location_id}")
}

#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub account_management: String,
    pub business_information: String,
    pub v4: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            account_management: "https://mybusinessaccountmanagement.googleapis.com/v1".into(),
            business_information: "https://mybusinessbusinessinformation.googleapis.com/v1".into(),
            v4: "https://mybusiness.googleapis.com/v4".into(),
        }
    }
}

impl GoogleEndpoints {
    /// Point every API at one base URL (mock servers).
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            account_management: format!("{base}/v1"),
            business_information: format!("{base}/v1"),
            v4: format!("{base}/v4"),
        }
    }
}

const LOCATION_READ_MASK: &str = "name,title,phoneNumbers,storefrontAddress,websiteUri,categories,latlng,metadata";
const ACCOUNTS_PAGE_SIZE: &str = "20";
const LOCATIONS_PAGE_SIZE: &str = "100";
const REVIEWS_PAGE_SIZE: &str = "50";
const MEDIA_PAGE_SIZE: &str = "100";
const POSTS_PAGE_SIZE: &str = "100";

#[derive(Clone)]
pub struct GoogleClient {
    http: Client,
    endpoints: GoogleEndpoints,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GoogleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleClient")
            .field("http", &"<reqwest::Client>")
            .field("endpoints", &self.endpoints)
            .field("retry", &self.retry)
            .finish()
    }
}

impl GoogleClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self, GoogleError> {
        Ok(Self::with_http(auth::http_client(Self::REQUEST_TIMEOUT)?))
    }

    pub fn with_http(http: Client) -> Self {
        Self {
            http,
            endpoints: GoogleEndpoints::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Send an authenticated request, retrying transient failures. A fresh
    /// token is requested per attempt so a refresh can happen in between.
    async fn send<T, B>(
        &self,
        operation: &str,
        auth: &dyn TokenSource,
        build: B,
    ) -> Result<T, GoogleError>
    where
        T: DeserializeOwned,
        B: Fn(&Client) -> RequestBuilder,
    {
        let build = &build;
        let http = &self.http;
        retry_async(&self.retry, operation, GoogleError::is_transient, move || async move {
            let token = auth.access_token().await?;
            let response = build(http)
                .bearer_auth(token.token.expose_secret())
                .send()
                .await
                .map_err(GoogleError::from_reqwest)?;
            handle_response(response).await
        })
        .await
    }

    async fn list_page<T: DeserializeOwned>(
        &self,
        operation: &str,
        auth: &dyn TokenSource,
        url: String,
        query: Vec<(&'static str, String)>,
        page_token: Option<&str>,
    ) -> Result<T, GoogleError> {
        let mut query = query;
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        tracing::debug!(operation, url = %url, has_page_token = page_token.is_some(), "Listing Google resources");
        self.send(operation, auth, |http| http.get(&url).query(&query))
            .await
    }
}

#[derive(Deserialize)]
struct GoogleErrorBody {
    error: GoogleErrorDetail,
}

#[derive(Deserialize)]
struct GoogleErrorDetail {
    message: Option<String>,
    status: Option<String>,
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GoogleError> {
    let status = response.status();
    if status.is_success() {
        if status == StatusCode::NO_CONTENT {
            return serde_json::from_str("{}").map_err(|e| GoogleError::Decode(e.to_string()));
        }
        let bytes = response.bytes().await.map_err(GoogleError::from_reqwest)?;
        let body: &[u8] = if bytes.is_empty() { b"{}" } else { &bytes };
        return serde_json::from_slice(body).map_err(|e| GoogleError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<GoogleErrorBody>(&body) {
        Ok(parsed) => match (parsed.error.status, parsed.error.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (_, Some(message)) => message,
            (Some(code), None) => code,
            (None, None) => status.to_string(),
        },
        Err(_) => body.chars().take(200).collect(),
    };
    tracing::warn!(status = status.as_u16(), message = %message, "Google API returned error");
    Err(GoogleError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Placeholder body for calls that return nothing useful.
#[derive(Deserialize)]
struct Empty {}

#[async_trait]
impl GoogleApi for GoogleClient {
    async fn list_accounts(
        &self,
        auth: &dyn TokenSource,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleAccount>, GoogleError> {
        let url = format!("{}/accounts", self.endpoints.account_management);
        let response: ListAccountsResponse = self
            .list_page(
                "google.list_accounts",
                auth,
                url,
                vec![("pageSize", ACCOUNTS_PAGE_SIZE.to_string())],
                page_token,
            )
            .await?;
        Ok(Page {
            items: response.accounts,
            next_page_token: response.next_page_token,
        })
    }

    async fn list_locations(
        &self,
        auth: &dyn TokenSource,
        account: &str,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleLocation>, GoogleError> {
        let url = format!("{}/{}/locations", self.endpoints.business_information, account);
        let response: ListLocationsResponse = self
            .list_page(
                "google.list_locations",
                auth,
                url,
                vec![
                    ("readMask", LOCATION_READ_MASK.to_string()),
                    ("pageSize", LOCATIONS_PAGE_SIZE.to_string()),
                ],
                page_token,
            )
            .await?;

        let items = response
            .locations
            .into_iter()
            .map(|raw| {
                let mut location: GoogleLocation = serde_json::from_value(raw.clone())
                    .map_err(|e| GoogleError::Decode(e.to_string()))?;
                location.raw = raw;
                Ok(location)
            })
            .collect::<Result<Vec<_>, GoogleError>>()?;
        Ok(Page {
            items,
            next_page_token: response.next_page_token,
        })
    }

    async fn list_reviews(
        &self,
        auth: &dyn TokenSource,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleReview>, GoogleError> {
        let url = format!("{}/{}/reviews", self.endpoints.v4, location);
        let response: ListReviewsResponse = self
            .list_page(
                "google.list_reviews",
                auth,
                url,
                vec![("pageSize", REVIEWS_PAGE_SIZE.to_string())],
                page_token,
            )
            .await?;
        Ok(Page {
            items: response.reviews,
            next_page_token: response.next_page_token,
        })
    }

    async fn list_media(
        &self,
        auth: &dyn TokenSource,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleMediaItem>, GoogleError> {
        let url = format!("{}/{}/media", self.endpoints.v4, location);
        let response: ListMediaResponse = self
            .list_page(
                "google.list_media",
                auth,
                url,
                vec![("pageSize", MEDIA_PAGE_SIZE.to_string())],
                page_token,
            )
            .await?;
        Ok(Page {
            items: response.media_items,
            next_page_token: response.next_page_token,
        })
    }

    async fn list_local_posts(
        &self,
        auth: &dyn TokenSource,
        location: &str,
        page_token: Option<&str>,
    ) -> Result<Page<GoogleLocalPost>, GoogleError> {
        let url = format!("{}/{}/localPosts", self.endpoints.v4, location);
        let response: ListLocalPostsResponse = self
            .list_page(
                "google.list_local_posts",
                auth,
                url,
                vec![("pageSize", POSTS_PAGE_SIZE.to_string())],
                page_token,
            )
            .await?;
        Ok(Page {
            items: response.local_posts,
            next_page_token: response.next_page_token,
        })
    }

    async fn reply_to_review(
        &self,
        auth: &dyn TokenSource,
        review_name: &str,
        comment: &str,
    ) -> Result<ReviewReply, GoogleError> {
        let url = format!("{}/{}/reply", self.endpoints.v4, review_name);
        let body = serde_json::json!({ "comment": comment });
        self.send("google.reply_to_review", auth, |http| {
            http.request(Method::PUT, &url).json(&body)
        })
        .await
    }

    async fn delete_review_reply(
        &self,
        auth: &dyn TokenSource,
        review_name: &str,
    ) -> Result<(), GoogleError> {
        let url = format!("{}/{}/reply", self.endpoints.v4, review_name);
        let _: Empty = self
            .send("google.delete_review_reply", auth, |http| http.delete(&url))
            .await?;
        Ok(())
    }

    async fn create_local_post(
        &self,
        auth: &dyn TokenSource,
        location: &str,
        post: &NewLocalPost,
    ) -> Result<GoogleLocalPost, GoogleError> {
        let url = format!("{}/{}/localPosts", self.endpoints.v4, location);
        self.send("google.create_local_post", auth, |http| http.post(&url).json(post))
            .await
    }
}
