//! OAuth2 access tokens for the Business Profile APIs.
//!
//! Two ways to obtain a token: a service account key (signed JWT assertion)
//! or a user's refresh token captured by the consent flow. Both go through
//! [`CachedTokenSource`] so a token is reused until shortly before expiry.

use std::{path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use url::Url;

use super::GoogleError;

pub const BUSINESS_MANAGE_SCOPE: &str = "https://www.googleapis.com/auth/business.manage";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/v2/auth";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_TTL_SECS: i64 = 3600;
/// Tokens this close to expiry are refreshed.
const EXPIRY_MARGIN: chrono::Duration = chrono::Duration::seconds(60);

#[derive(Clone)]
pub struct AccessToken {
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<secret>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - EXPIRY_MARGIN > now
    }
}

#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, GoogleError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    refresh_token: Option<String>,
    scope: Option<String>,
    id_token: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

impl TokenResponse {
    fn access_token(&self) -> AccessToken {
        AccessToken {
            token: SecretString::from(self.access_token.clone()),
            expires_at: Utc::now() + chrono::Duration::seconds(self.expires_in),
        }
    }
}

async fn post_token_form(
    http: &Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, GoogleError> {
    let response = http
        .post(token_uri)
        .form(form)
        .send()
        .await
        .map_err(GoogleError::from_reqwest)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GoogleError::Auth(format!(
            "token endpoint returned {}: {}",
            status.as_u16(),
            oauth_error_message(&body)
        )));
    }
    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| GoogleError::Decode(e.to_string()))
}

/// `{"error": "invalid_grant", "error_description": "..."}` to a message.
fn oauth_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: String,
        error_description: Option<String>,
    }
    match serde_json::from_str::<OAuthErrorBody>(body) {
        Ok(e) => match e.error_description {
            Some(description) => format!("{}: {}", e.error, description),
            None => e.error,
        },
        Err(_) => body.chars().take(200).collect(),
    }
}

/// The fields of a downloaded service account key file we need.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: SecretString,
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, GoogleError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GoogleError::Config(format!(
                "cannot read service account key {}: {e}",
                path.display()
            ))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| GoogleError::Config(format!("invalid service account key: {e}")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Exchanges a self-signed RS256 assertion for an access token.
pub struct ServiceAccountTokenSource {
    http: Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scope: String,
}

impl ServiceAccountTokenSource {
    pub fn new(http: Client, key: ServiceAccountKey) -> Result<Self, GoogleError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())
            .map_err(|e| GoogleError::Config(format!("invalid service account private key: {e}")))?;
        Ok(Self {
            http,
            key,
            encoding_key,
            scope: BUSINESS_MANAGE_SCOPE.to_string(),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    pub fn assertion(&self, now: DateTime<Utc>) -> Result<String, GoogleError> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.key.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_TTL_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| GoogleError::Auth(format!("failed to sign assertion: {e}")))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<AccessToken, GoogleError> {
        let assertion = self.assertion(Utc::now())?;
        tracing::debug!(client_email = %self.key.client_email, "Requesting service account token");
        let response = post_token_form(
            &self.http,
            &self.key.token_uri,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)],
        )
        .await?;
        Ok(response.access_token())
    }
}

/// Exchanges a stored user refresh token for an access token.
pub struct RefreshTokenSource {
    http: Client,
    token_uri: String,
    client_id: String,
    client_secret: SecretString,
    refresh_token: SecretString,
}

impl RefreshTokenSource {
    pub fn new(
        http: Client,
        token_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        refresh_token: SecretString,
    ) -> Self {
        Self {
            http,
            token_uri: token_uri.into(),
            client_id: client_id.into(),
            client_secret,
            refresh_token,
        }
    }
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn access_token(&self) -> Result<AccessToken, GoogleError> {
        let response = post_token_form(
            &self.http,
            &self.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", &self.client_id),
                ("client_secret", self.client_secret.expose_secret()),
                ("refresh_token", self.refresh_token.expose_secret()),
            ],
        )
        .await?;
        Ok(response.access_token())
    }
}

/// Reuses the inner source's token until it is about to expire.
pub struct CachedTokenSource {
    inner: Arc<dyn TokenSource>,
    cached: Mutex<Option<AccessToken>>,
}

impl CachedTokenSource {
    pub fn new(inner: Arc<dyn TokenSource>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenSource for CachedTokenSource {
    async fn access_token(&self) -> Result<AccessToken, GoogleError> {
        // Held across the refresh so concurrent callers wait for one exchange.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && token.is_fresh(Utc::now())
        {
            return Ok(token.clone());
        }
        let token = self.inner.access_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// Tokens returned by the authorization code exchange.
#[derive(Debug)]
pub struct OAuthGrant {
    pub access_token: AccessToken,
    pub refresh_token: Option<SecretString>,
    pub scope: String,
    /// From the `email` claim of the id token, when `email` scope was granted.
    pub email: Option<String>,
}

/// Authorization code flow for linking a user's Google identity.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: Client,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    auth_uri: String,
    token_uri: String,
}

impl GoogleOAuthClient {
    pub fn new(
        http: Client,
        client_id: impl Into<String>,
        client_secret: SecretString,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret,
            redirect_uri: redirect_uri.into(),
            auth_uri: DEFAULT_AUTH_URI.to_string(),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        }
    }

    pub fn with_endpoints(mut self, auth_uri: impl Into<String>, token_uri: impl Into<String>) -> Self {
        self.auth_uri = auth_uri.into();
        self.token_uri = token_uri.into();
        self
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// Refresh-token source for a credential captured by this client.
    pub fn refresh_source(&self, refresh_token: SecretString) -> RefreshTokenSource {
        RefreshTokenSource::new(
            self.http.clone(),
            self.token_uri.clone(),
            self.client_id.clone(),
            self.client_secret.clone(),
            refresh_token,
        )
    }

    /// Consent screen URL. `prompt=consent` makes Google return a refresh
    /// token even when the user has linked before.
    pub fn authorize_url(&self, state: &str) -> Result<Url, GoogleError> {
        let mut url = Url::parse(&self.auth_uri)
            .map_err(|e| GoogleError::Config(format!("invalid auth uri: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &format!("openid email {BUSINESS_MANAGE_SCOPE}"))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("include_granted_scopes", "true")
            .append_pair("state", state);
        Ok(url)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<OAuthGrant, GoogleError> {
        let response = post_token_form(
            &self.http,
            &self.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.client_id),
                ("client_secret", self.client_secret.expose_secret()),
                ("redirect_uri", &self.redirect_uri),
            ],
        )
        .await?;

        Ok(OAuthGrant {
            access_token: response.access_token(),
            refresh_token: response.refresh_token.clone().map(SecretString::from),
            scope: response
                .scope
                .clone()
                .unwrap_or_else(|| BUSINESS_MANAGE_SCOPE.to_string()),
            email: response.id_token.as_deref().and_then(email_from_id_token),
        })
    }
}

/// Read the `email` claim of an id token received directly from the token
/// endpoint over TLS. The signature is not checked.
fn email_from_id_token(id_token: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct IdClaims {
        email: Option<String>,
    }
    let payload = id_token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    serde_json::from_slice::<IdClaims>(&bytes).ok()?.email
}

/// Shared HTTP client for token endpoints and API calls.
pub fn http_client(timeout: Duration) -> Result<Client, GoogleError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(utils::build_info::USER_AGENT)
        .build()
        .map_err(|e| GoogleError::Config(format!("failed to build HTTP client: {e}")))
}
