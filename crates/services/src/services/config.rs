//! Process configuration read from the environment.
//!
//! `main` loads `.env` with `dotenvy` before calling [`AppConfig::from_env`].

use std::{path::PathBuf, time::Duration};

use secrecy::SecretString;
use thiserror::Error;
use utils::{assets::storage_dir, path::expand_tilde};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable `{0}` is not set")]
    Missing(&'static str),
    #[error("environment variable `{name}` is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
}

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30 * 60;
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Default)]
pub struct GoogleConfig {
    /// Service account key JSON used when an account has no user credential.
    pub service_account_file: Option<PathBuf>,
    pub oauth: Option<OAuthClientConfig>,
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub openai_api_key: Option<SecretString>,
    pub openai_model: String,
    pub anthropic_api_key: Option<SecretString>,
    pub anthropic_model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            anthropic_api_key: None,
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    /// Prefix for public file URLs, without trailing slash.
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// HS256 secret shared with the auth provider; base64 or raw.
    pub auth_jwt_secret: SecretString,
    pub google: GoogleConfig,
    pub ai: AiConfig,
    pub storage: StorageConfig,
    /// `None` disables the background sync.
    pub sync_interval: Option<Duration>,
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let host = get("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let auth_jwt_secret = get("AUTH_JWT_SECRET")
            .map(SecretString::from)
            .ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?;

        let oauth = match (
            get("GOOGLE_CLIENT_ID"),
            get("GOOGLE_CLIENT_SECRET"),
            get("GOOGLE_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(OAuthClientConfig {
                client_id,
                client_secret: SecretString::from(client_secret),
                redirect_uri,
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::ValidationError(
                    "GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET and GOOGLE_REDIRECT_URI must be set together"
                        .to_string(),
                ));
            }
        };

        let google = GoogleConfig {
            service_account_file: get("GOOGLE_SERVICE_ACCOUNT_FILE").map(|p| expand_tilde(&p)),
            oauth,
        };

        let ai = AiConfig {
            openai_api_key: get("OPENAI_API_KEY").map(SecretString::from),
            openai_model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            anthropic_api_key: get("ANTHROPIC_API_KEY").map(SecretString::from),
            anthropic_model: get("ANTHROPIC_MODEL")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
        };

        let storage = StorageConfig {
            root: get("GBP_STORAGE_DIR")
                .map(|p| expand_tilde(&p))
                .unwrap_or_else(storage_dir),
            public_base_url: get("PUBLIC_BASE_URL")
                .unwrap_or_else(|| format!("http://{host}:{port}"))
                .trim_end_matches('/')
                .to_string(),
        };

        let sync_interval = match get("GBP_SYNC_INTERVAL_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: "GBP_SYNC_INTERVAL_SECS",
                    reason: e.to_string(),
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            None => Some(Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS)),
        };

        Ok(Self {
            host,
            port,
            auth_jwt_secret,
            google,
            ai,
            storage,
            sync_interval,
            sentry_dsn: get("SENTRY_DSN"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = config_from(&[("AUTH_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 3001);
        assert_eq!(config.auth_jwt_secret.expose_secret(), "s3cret");
        assert_eq!(config.storage.public_base_url, "http://127.0.0.1:3001");
        assert_eq!(config.sync_interval, Some(Duration::from_secs(1800)));
        assert!(config.google.oauth.is_none());
        assert_eq!(config.ai.openai_model, "gpt-4o-mini");
    }

    #[test]
    fn test_missing_secret_is_an_error() {
        assert!(matches!(
            config_from(&[("AUTH_JWT_SECRET", "   ")]),
            Err(ConfigError::Missing("AUTH_JWT_SECRET"))
        ));
    }

    #[test]
    fn test_zero_interval_disables_sync() {
        let config = config_from(&[
            ("AUTH_JWT_SECRET", "x"),
            ("GBP_SYNC_INTERVAL_SECS", "0"),
            ("PUBLIC_BASE_URL", "https://gbp.example.com/"),
        ])
        .unwrap();
        assert_eq!(config.sync_interval, None);
        assert_eq!(config.storage.public_base_url, "https://gbp.example.com");
    }

    #[test]
    fn test_partial_oauth_config_is_rejected() {
        let result = config_from(&[("AUTH_JWT_SECRET", "x"), ("GOOGLE_CLIENT_ID", "id")]);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_invalid_port() {
        let result = config_from(&[("AUTH_JWT_SECRET", "x"), ("PORT", "http")]);
        assert!(matches!(result, Err(ConfigError::Invalid { name: "PORT", .. })));
    }
}
