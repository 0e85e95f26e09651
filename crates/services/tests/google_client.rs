//! GoogleClient and token sources against a mock Google.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use services::services::google::{
    AccessToken, GoogleApi, GoogleClient, GoogleEndpoints, GoogleError, TokenSource,
    PageCursor,
    auth::{AssertionClaims, CachedTokenSource, ServiceAccountKey, ServiceAccountTokenSource},
};
use utils::retry::RetryPolicy;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_string_contains, header, method, path, query_param},
};

const PRIVATE_KEY: &str = include_str!("fixtures/service_account_key.pem");
const PUBLIC_KEY: &str = include_str!("fixtures/service_account_pub.pem");

struct StaticToken;

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<AccessToken, GoogleError> {
        Ok(AccessToken {
            token: SecretString::from("test-token"),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

fn client(server: &MockServer) -> GoogleClient {
    GoogleClient::with_http(Client::new())
        .with_endpoints(GoogleEndpoints::single(&server.uri()))
        .with_retry_policy(RetryPolicy::linear(
            3,
            Duration::from_millis(10),
            Duration::from_millis(50),
        ))
}

fn service_account_key(token_uri: String) -> ServiceAccountKey {
    serde_json::from_value(json!({
        "type": "service_account",
        "client_email": "sync@gbp-hub.iam.gserviceaccount.com",
        "private_key": PRIVATE_KEY,
        "private_key_id": "key-1",
        "token_uri": token_uri,
    }))
    .unwrap()
}

#[tokio::test]
async fn test_list_locations_walks_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts/100/locations"))
        .and(query_param("pageToken", "p2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "locations": [{ "name": "locations/3", "title": "Third" }]
        })))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts/100/locations"))
        .and(header("authorization", "Bearer test-token"))
        .and(query_param("pageSize", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "locations": [
                { "name": "locations/1", "title": "First" },
                { "name": "locations/2", "title": "Second" }
            ],
            "nextPageToken": "p2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let google = client(&server);
    let mut cursor = PageCursor::new();
    let mut locations = Vec::new();
    loop {
        let page = google
            .list_locations(&StaticToken, "accounts/100", cursor.token())
            .await
            .unwrap();
        locations.extend(page.items);
        if !cursor.advance(page.next_page_token).unwrap() {
            break;
        }
    }
    assert_eq!(cursor.pages(), 2);

    let titles: Vec<_> = locations.iter().filter_map(|l| l.title.clone()).collect();
    assert_eq!(titles, vec!["First", "Second", "Third"]);
    assert_eq!(locations[0].raw["title"], "First");
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v4/accounts/1/locations/2/reviews"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": 503, "message": "Backend unavailable", "status": "UNAVAILABLE" }
        })))
        .with_priority(1)
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/accounts/1/locations/2/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reviews": [{
                "name": "accounts/1/locations/2/reviews/r1",
                "reviewId": "r1",
                "starRating": "FIVE"
            }]
        })))
        .mount(&server)
        .await;

    let page = client(&server)
        .list_reviews(&StaticToken, "accounts/1/locations/2", None)
        .await
        .unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].stars(), Some(5));
    assert!(page.next_page_token.is_none());
}

#[tokio::test]
async fn test_permission_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "The caller does not have permission", "status": "PERMISSION_DENIED" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .list_accounts(&StaticToken, None)
        .await
        .unwrap_err();
    match err {
        GoogleError::Api { status, message } => {
            assert_eq!(status, 403);
            assert_eq!(message, "PERMISSION_DENIED: The caller does not have permission");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_reply_and_delete_reply() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v4/accounts/1/locations/2/reviews/r1/reply"))
        .and(body_json(json!({ "comment": "Thanks for visiting!" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "comment": "Thanks for visiting!",
            "updateTime": "2026-10-01T12:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v4/accounts/1/locations/2/reviews/r1/reply"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&server)
        .await;

    let google = client(&server);
    let reply = google
        .reply_to_review(&StaticToken, "accounts/1/locations/2/reviews/r1", "Thanks for visiting!")
        .await
        .unwrap();
    assert_eq!(reply.comment, "Thanks for visiting!");
    assert!(reply.update_time.is_some());

    google
        .delete_review_reply(&StaticToken, "accounts/1/locations/2/reviews/r1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_service_account_assertion_is_signed_with_key() {
    let source = ServiceAccountTokenSource::new(
        Client::new(),
        service_account_key("https://oauth2.googleapis.com/token".into()),
    )
    .unwrap();
    let assertion = source.assertion(Utc::now()).unwrap();

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["https://oauth2.googleapis.com/token"]);
    validation.set_issuer(&["sync@gbp-hub.iam.gserviceaccount.com"]);
    let decoded = decode::<AssertionClaims>(
        &assertion,
        &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
        &validation,
    )
    .unwrap();

    assert_eq!(decoded.header.kid.as_deref(), Some("key-1"));
    assert_eq!(decoded.claims.scope, "https://www.googleapis.com/auth/business.manage");
    assert_eq!(decoded.claims.exp - decoded.claims.iat, 3600);
}

#[tokio::test]
async fn test_service_account_token_exchange_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.service",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = ServiceAccountTokenSource::new(
        Client::new(),
        service_account_key(format!("{}/token", server.uri())),
    )
    .unwrap();
    let cached = CachedTokenSource::new(Arc::new(source));

    let first = cached.access_token().await.unwrap();
    let second = cached.access_token().await.unwrap();
    assert_eq!(first.token.expose_secret(), "ya29.service");
    assert_eq!(second.token.expose_secret(), "ya29.service");
}

#[tokio::test]
async fn test_rejected_assertion_is_an_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&server)
        .await;

    let source = ServiceAccountTokenSource::new(
        Client::new(),
        service_account_key(format!("{}/token", server.uri())),
    )
    .unwrap();
    let err = source.access_token().await.unwrap_err();
    assert!(
        matches!(&err, GoogleError::Auth(message) if message.contains("invalid_grant: Invalid JWT Signature.")),
        "{err:?}"
    );
    assert!(!err.is_transient());
}
