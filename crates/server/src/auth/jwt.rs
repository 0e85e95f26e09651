//! HS256 session tokens and OAuth `state` tokens.
//!
//! Session tokens come from the auth provider and are only validated here;
//! `issue_session` exists for tooling and tests. OAuth state tokens are
//! minted by the authorize route and checked on the callback.

use std::collections::HashSet;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const SESSION_AUDIENCE: &str = "authenticated";
const OAUTH_STATE_AUDIENCE: &str = "google-oauth-state";
const OAUTH_STATE_TTL_MINUTES: i64 = 10;
const LEEWAY_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid secret: {0}")]
    InvalidSecret(String),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub user_id: Uuid,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OAuthStateClaims {
    sub: Uuid,
    nonce: Uuid,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtService {
    /// `secret` is used as raw bytes, or base64-decoded when prefixed with
    /// `base64:`.
    pub fn new(secret: &SecretString) -> Result<Self, JwtError> {
        let bytes = key_bytes(secret.expose_secret())?;
        Ok(Self {
            encoding: EncodingKey::from_secret(&bytes),
            decoding: DecodingKey::from_secret(&bytes),
        })
    }

    pub fn decode_session(&self, token: &str) -> Result<SessionIdentity, JwtError> {
        if token.trim().is_empty() {
            return Err(JwtError::InvalidToken);
        }
        let validation = validation(SESSION_AUDIENCE);
        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)?.claims;
        Ok(SessionIdentity {
            user_id: claims.sub,
            email: claims.email,
        })
    }

    pub fn issue_session(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        ttl: ChronoDuration,
    ) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: user_id,
            email: email.map(str::to_string),
            aud: SESSION_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Short-lived `state` value binding a consent redirect to `user_id`.
    pub fn issue_oauth_state(&self, user_id: Uuid) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = OAuthStateClaims {
            sub: user_id,
            nonce: Uuid::new_v4(),
            aud: OAUTH_STATE_AUDIENCE.to_string(),
            iat: now.timestamp(),
            exp: (now + ChronoDuration::minutes(OAUTH_STATE_TTL_MINUTES)).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Returns the user the state was issued for.
    pub fn verify_oauth_state(&self, state: &str) -> Result<Uuid, JwtError> {
        let validation = validation(OAUTH_STATE_AUDIENCE);
        Ok(decode::<OAuthStateClaims>(state, &self.decoding, &validation)?
            .claims
            .sub)
    }
}

fn validation(audience: &str) -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.validate_nbf = false;
    validation.set_audience(&[audience]);
    validation.required_spec_claims =
        HashSet::from(["sub".to_string(), "exp".to_string(), "aud".to_string()]);
    validation.leeway = LEEWAY_SECS;
    validation
}

fn key_bytes(secret: &str) -> Result<Vec<u8>, JwtError> {
    let bytes = match secret.strip_prefix("base64:") {
        Some(encoded) => STANDARD
            .decode(encoded.trim())
            .map_err(|e| JwtError::InvalidSecret(e.to_string()))?,
        None => secret.as_bytes().to_vec(),
    };
    if bytes.len() < 16 {
        return Err(JwtError::InvalidSecret(
            "secret must be at least 16 bytes".to_string(),
        ));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new(&SecretString::from("super-secret-jwt-token-for-tests")).unwrap()
    }

    #[test]
    fn test_session_roundtrip() {
        let jwt = service();
        let user_id = Uuid::new_v4();
        let token = jwt
            .issue_session(user_id, Some("owner@example.com"), ChronoDuration::hours(1))
            .unwrap();

        let identity = jwt.decode_session(&token).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.email.as_deref(), Some("owner@example.com"));
    }

    #[test]
    fn test_expired_session_is_rejected() {
        let jwt = service();
        let token = jwt
            .issue_session(Uuid::new_v4(), None, ChronoDuration::minutes(-5))
            .unwrap();
        assert!(jwt.decode_session(&token).is_err());
    }

    #[test]
    fn test_other_secret_is_rejected() {
        let token = service()
            .issue_session(Uuid::new_v4(), None, ChronoDuration::hours(1))
            .unwrap();
        let other = JwtService::new(&SecretString::from("another-secret-entirely-123")).unwrap();
        assert!(other.decode_session(&token).is_err());
    }

    #[test]
    fn test_state_token_is_not_a_session() {
        let jwt = service();
        let user_id = Uuid::new_v4();
        let state = jwt.issue_oauth_state(user_id).unwrap();

        assert_eq!(jwt.verify_oauth_state(&state).unwrap(), user_id);
        assert!(jwt.decode_session(&state).is_err());
    }

    #[test]
    fn test_base64_secret() {
        let encoded = format!("base64:{}", STANDARD.encode([7u8; 32]));
        assert!(JwtService::new(&SecretString::from(encoded)).is_ok());
        assert!(matches!(
            JwtService::new(&SecretString::from("short")),
            Err(JwtError::InvalidSecret(_))
        ));
    }
}
