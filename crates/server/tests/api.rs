//! HTTP surface tests: the full router driven with `oneshot`, SQLite in a
//! temp dir, Google mocked with wiremock.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::Utc;
use db::{DBService, test_utils::create_test_pool};
use secrecy::SecretString;
use serde_json::{Value, json};
use server::{AppState, auth::JwtService, routes};
use services::services::{
    ai::AiService,
    config::AppConfig,
    gmb_sync::{GmbSyncService, TokenResolver},
    google::{
        AccessToken, GoogleClient, GoogleEndpoints, GoogleError, TokenSource,
        auth::{GoogleOAuthClient, http_client},
    },
    storage::StorageService,
};
use tempfile::TempDir;
use tower::ServiceExt;
use utils::retry::RetryPolicy;
use uuid::Uuid;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path},
};

const SECRET: &str = "test-secret-that-is-long-enough";

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

struct TestApp {
    router: Router,
    jwt: JwtService,
    google: MockServer,
    _dir: TempDir,
}

impl TestApp {
    async fn new(with_oauth: bool) -> Self {
        let (pool, dir) = create_test_pool().await;
        let db = DBService::from_pool(pool);
        let google = MockServer::start().await;

        let storage_root = dir.path().join("storage");
        let vars: HashMap<&str, String> = HashMap::from([
            ("AUTH_JWT_SECRET", SECRET.to_string()),
            ("GBP_STORAGE_DIR", storage_root.display().to_string()),
            ("PUBLIC_BASE_URL", "http://localhost:3001".to_string()),
            ("GBP_SYNC_INTERVAL_SECS", "0".to_string()),
        ]);
        let config = AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap();

        let oauth = with_oauth.then(|| {
            GoogleOAuthClient::new(
                http_client(Duration::from_secs(5)).unwrap(),
                "client-id",
                SecretString::from("client-secret"),
                "http://localhost:5173/oauth/callback",
            )
            .with_endpoints(
                format!("{}/o/oauth2/auth", google.uri()),
                format!("{}/token", google.uri()),
            )
        });
        let tokens = TokenResolver::new(Some(Arc::new(StaticToken)), oauth);
        let client = GoogleClient::new()
            .unwrap()
            .with_endpoints(GoogleEndpoints::single(&google.uri()))
            .with_retry_policy(RetryPolicy::linear(
                1,
                Duration::from_millis(5),
                Duration::from_millis(5),
            ));
        let sync = Arc::new(GmbSyncService::new(
            db.clone(),
            Arc::new(client),
            Arc::new(tokens),
        ));
        let storage = StorageService::from_config(&config.storage);

        let state = AppState::new(
            db,
            config,
            JwtService::new(&SecretString::from(SECRET)).unwrap(),
            sync,
            AiService::new(Vec::new()),
            storage,
        );

        Self {
            router: routes::router(state),
            jwt: JwtService::new(&SecretString::from(SECRET)).unwrap(),
            google,
            _dir: dir,
        }
    }

    fn token(&self, user: Uuid) -> String {
        self.jwt
            .issue_session(user, Some("owner@example.com"), chrono::Duration::hours(1))
            .unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Uuid,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn create_location(&self, user: Uuid, title: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/locations",
                user,
                Some(json!({
                    "account_id": null,
                    "title": title,
                    "address": "123 Main Street",
                    "locality": "Springfield",
                    "region": "IL",
                    "postal_code": "62701",
                    "country_code": "US",
                    "phone": "(217) 555-0100",
                    "website_uri": "https://example.com",
                    "primary_category": "Bakery"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_is_public_and_tags_requests() {
    let app = TestApp::new(false).await;
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database_ready"], true);
}

#[tokio::test]
async fn test_protected_routes_require_a_valid_session() {
    let app = TestApp::new(false).await;

    let (status, body) = app
        .send(Request::get("/api/locations").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "missing bearer token");

    let (status, body) = app
        .send(
            Request::get("/api/locations")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid or expired session");

    let other = JwtService::new(&SecretString::from("some-other-secret-value")).unwrap();
    let forged = other
        .issue_session(Uuid::new_v4(), None, chrono::Duration::hours(1))
        .unwrap();
    let (status, _) = app
        .send(
            Request::get("/api/locations")
                .header(header::AUTHORIZATION, format!("Bearer {forged}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_locations_are_scoped_to_their_owner() {
    let app = TestApp::new(false).await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let location = app.create_location(owner, "Corner Bakery").await;
    let uri = format!("/api/locations/{}", id_of(&location));

    let (status, body) = app.call(Method::GET, "/api/locations", stranger, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);

    let (status, body) = app.call(Method::GET, &uri, stranger, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "location not found");

    let (status, body) = app
        .call(Method::PATCH, &uri, owner, Some(json!({ "title": "Corner Bakery & Cafe" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Corner Bakery & Cafe");
    assert_eq!(body["phone"], "(217) 555-0100");

    let (status, _) = app
        .call(Method::PATCH, &uri, owner, Some(json!({ "title": "  " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call(Method::DELETE, &uri, stranger, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.call(Method::DELETE, &uri, owner, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::GET, &uri, owner, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_account_validation() {
    let app = TestApp::new(false).await;
    let user = Uuid::new_v4();

    let (status, _) = app
        .call(
            Method::POST,
            "/api/accounts",
            user,
            Some(json!({ "google_name": "100", "account_name": "Main Street Group" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/accounts",
            user,
            Some(json!({
                "google_name": "accounts/100",
                "account_name": "Main Street Group",
                "credential_id": Uuid::new_v4()
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("credential"));

    let payload = json!({ "google_name": "accounts/100", "account_name": "Main Street Group" });
    let (status, _) = app
        .call(Method::POST, "/api/accounts", user, Some(payload.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .call(Method::POST, "/api/accounts", user, Some(payload))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_post_lifecycle_on_manual_location() {
    let app = TestApp::new(false).await;
    let user = Uuid::new_v4();
    let location = app.create_location(user, "Corner Bakery").await;
    let posts_uri = format!("/api/locations/{}/posts", id_of(&location));

    let (status, _) = app
        .call(
            Method::POST,
            &posts_uri,
            user,
            Some(json!({ "summary": "x".repeat(1501) })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call(
            Method::POST,
            &posts_uri,
            user,
            Some(json!({ "summary": "Fresh bread", "call_to_action_type": "ORDER" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, post) = app
        .call(
            Method::POST,
            &posts_uri,
            user,
            Some(json!({
                "topic_type": "offer",
                "summary": "Two croissants for one",
                "call_to_action_type": "ORDER",
                "call_to_action_url": "https://example.com/order"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{post}");
    assert_eq!(post["status"], "draft");
    assert_eq!(post["topic_type"], "offer");
    let post_uri = format!("/api/posts/{}", id_of(&post));

    let (status, post) = app
        .call(
            Method::PATCH,
            &post_uri,
            user,
            Some(json!({ "summary": "Three croissants for two" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(post["summary"], "Three croissants for two");

    // Manual locations have no Google counterpart to publish to.
    let (status, body) = app
        .call(Method::POST, &format!("{post_uri}/publish"), user, None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("not linked"));

    let (status, posts) = app.call(Method::GET, &posts_uri, user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(posts.as_array().unwrap().len(), 1);

    let (status, _) = app.call(Method::DELETE, &post_uri, user, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, posts) = app.call(Method::GET, &posts_uri, user, None).await;
    assert_eq!(posts.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_citations_duplicate_and_nap_check() {
    let app = TestApp::new(false).await;
    let user = Uuid::new_v4();
    let location = app.create_location(user, "Corner Bakery").await;
    let citations_uri = format!("/api/locations/{}/citations", id_of(&location));

    let (status, yelp) = app
        .call(
            Method::POST,
            &citations_uri,
            user,
            Some(json!({
                "directory": "Yelp",
                "listing_url": "https://yelp.com/biz/corner-bakery",
                "listed_name": "corner bakery",
                "listed_address": "123 Main St",
                "listed_phone": "217.555.0100"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(yelp["nap_status"], "unchecked");

    let (status, _) = app
        .call(
            Method::POST,
            &citations_uri,
            user,
            Some(json!({ "directory": "Yelp" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .call(
            Method::POST,
            &citations_uri,
            user,
            Some(json!({
                "directory": "Bing Places",
                "listed_name": "Corner Bakery",
                "listed_phone": "(217) 555-0199"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, checked) = app
        .call(Method::POST, &format!("{citations_uri}/check"), user, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let checked = checked.as_array().unwrap();
    assert_eq!(checked.len(), 2);

    let by_directory = |name: &str| {
        checked
            .iter()
            .find(|c| c["directory"] == name)
            .cloned()
            .unwrap()
    };
    assert_eq!(by_directory("Yelp")["nap_status"], "consistent");
    let bing = by_directory("Bing Places");
    assert_eq!(bing["nap_status"], "inconsistent");
    assert_eq!(bing["mismatched_fields"], json!(["phone"]));
    assert!(bing["last_checked_at"].is_string());
}

#[tokio::test]
async fn test_media_upload_serve_and_delete() {
    let app = TestApp::new(false).await;
    let user = Uuid::new_v4();
    let location = app.create_location(user, "Corner Bakery").await;
    let media_uri = format!("/api/locations/{}/media", id_of(&location));

    let boundary = "gbp-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\nStorefront\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"Front Door.png\"\r\n\
         Content-Type: image/png\r\n\r\nnot really a png\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::post(&media_uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(user)))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, item) = app.send(request).await;
    assert_eq!(status, StatusCode::CREATED, "{item}");
    assert_eq!(item["media_format"], "photo");
    assert_eq!(item["description"], "Storefront");
    let storage_path = item["storage_path"].as_str().unwrap().to_string();
    assert!(storage_path.ends_with("-front-door.png"));
    let public_url = item["public_url"].as_str().unwrap();
    assert_eq!(
        public_url,
        format!("http://localhost:3001/storage/media/{storage_path}")
    );

    let served = app
        .router
        .clone()
        .oneshot(
            Request::get(format!("/storage/media/{storage_path}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(served.status(), StatusCode::OK);
    let bytes = to_bytes(served.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"not really a png");

    let (status, listed) = app.call(Method::GET, &media_uri, user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed[0]["public_url"], public_url);

    let (status, files) = app
        .call(Method::GET, &format!("{media_uri}/files"), user, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(files.as_array().unwrap().len(), 1);
    assert_eq!(files[0]["path"], storage_path.as_str());
    assert_eq!(files[0]["content_type"], "image/png");
    assert_eq!(files[0]["size"], 16);

    let stranger = Uuid::new_v4();
    let (status, _) = app
        .call(Method::GET, &format!("{media_uri}/files"), stranger, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/media/{}", id_of(&item)), user, None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let gone = app
        .router
        .clone()
        .oneshot(
            Request::get(format!("/storage/media/{storage_path}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_media_upload_requires_file_field() {
    let app = TestApp::new(false).await;
    let user = Uuid::new_v4();
    let location = app.create_location(user, "Corner Bakery").await;

    let boundary = "gbp-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\nNo file\r\n--{b}--\r\n",
        b = boundary
    );
    let request = Request::post(format!("/api/locations/{}/media", id_of(&location)))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(user)))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn test_rankings_and_insights() {
    let app = TestApp::new(false).await;
    let user = Uuid::new_v4();
    let location = app.create_location(user, "Corner Bakery").await;
    let base = format!("/api/locations/{}", id_of(&location));

    for (position, hours_ago) in [(8, 48), (5, 1)] {
        let checked_at = Utc::now() - chrono::Duration::hours(hours_ago);
        let (status, _) = app
            .call(
                Method::POST,
                &format!("{base}/rankings"),
                user,
                Some(json!({
                    "keyword": "  Bakery Springfield ",
                    "position": position,
                    "checked_at": checked_at
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, _) = app
        .call(
            Method::POST,
            &format!("{base}/rankings"),
            user,
            Some(json!({ "keyword": "bakery", "position": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, summary) = app
        .call(Method::GET, &format!("{base}/rankings/summary"), user, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary[0]["keyword"], "bakery springfield");
    assert_eq!(summary[0]["position"], 5);
    assert_eq!(summary[0]["previous_position"], 8);
    assert_eq!(summary[0]["change"], 3);

    let points = json!([
        { "metric": "WEBSITE_CLICKS", "metric_date": "2026-10-01", "value": 4 },
        { "metric": "WEBSITE_CLICKS", "metric_date": "2026-10-02", "value": 6 },
        { "metric": "CALL_CLICKS", "metric_date": "2026-10-02", "value": 1 }
    ]);
    let (status, body) = app
        .call(Method::PUT, &format!("{base}/insights"), user, Some(points))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["upserted"], 3);

    // Same day again replaces the value.
    let (status, _) = app
        .call(
            Method::PUT,
            &format!("{base}/insights"),
            user,
            Some(json!([{ "metric": "WEBSITE_CLICKS", "metric_date": "2026-10-02", "value": 10 }])),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .call(
            Method::PUT,
            &format!("{base}/insights"),
            user,
            Some(json!([{ "metric": "CALL_CLICKS", "metric_date": "2026-10-03", "value": -1 }])),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, rows) = app
        .call(
            Method::GET,
            &format!("{base}/insights?metric=WEBSITE_CLICKS"),
            user,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows.as_array().unwrap().len(), 2);

    let (status, _) = app
        .call(
            Method::GET,
            &format!("{base}/insights?from=2026-10-05&to=2026-10-01"),
            user,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, totals) = app
        .call(Method::GET, &format!("{base}/insights/summary"), user, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let clicks = totals
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["metric"] == "WEBSITE_CLICKS")
        .unwrap();
    assert_eq!(clicks["total"], 14);
    assert_eq!(clicks["days"], 2);
}

async fn mount_google_business(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accounts": [{ "name": "accounts/100", "accountName": "Main Street Group", "type": "PERSONAL" }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/accounts/100/locations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "locations": [{ "name": "locations/1", "title": "Downtown" }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/accounts/100/locations/1/reviews"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reviews": [{
                "name": "accounts/100/locations/1/reviews/a",
                "reviewId": "a",
                "starRating": "FOUR",
                "comment": "Lovely bread"
            }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/accounts/100/locations/1/media"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v4/accounts/100/locations/1/localPosts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sync_then_reply_through_the_api() {
    let app = TestApp::new(false).await;
    mount_google_business(&app.google).await;
    Mock::given(method("PUT"))
        .and(path("/v4/accounts/100/locations/1/reviews/a/reply"))
        .and(body_json(json!({ "comment": "Thank you!" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "comment": "Thank you!",
            "updateTime": "2026-10-01T12:00:00Z"
        })))
        .expect(1)
        .mount(&app.google)
        .await;
    let user = Uuid::new_v4();

    let (status, job) = app.call(Method::POST, "/api/sync/accounts", user, None).await;
    assert_eq!(status, StatusCode::OK, "{job}");
    assert_eq!(job["status"], "succeeded");
    assert_eq!(job["items_synced"], 1);

    let (_, accounts) = app.call(Method::GET, "/api/accounts", user, None).await;
    let account_id = id_of(&accounts[0]);

    let (status, job) = app
        .call(
            Method::POST,
            &format!("/api/sync/accounts/{account_id}?scope=full"),
            user,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{job}");
    assert_eq!(job["job_type"], "full");
    assert_eq!(job["status"], "succeeded");

    let (_, locations) = app
        .call(
            Method::GET,
            &format!("/api/locations?account_id={account_id}"),
            user,
            None,
        )
        .await;
    assert_eq!(locations.as_array().unwrap().len(), 1);
    let location_id = id_of(&locations[0]);

    let (_, reviews) = app
        .call(
            Method::GET,
            &format!("/api/locations/{location_id}/reviews?unreplied=true"),
            user,
            None,
        )
        .await;
    assert_eq!(reviews.as_array().unwrap().len(), 1);
    assert_eq!(reviews[0]["star_rating"], 4);
    let review_uri = format!("/api/reviews/{}/reply", id_of(&reviews[0]));

    let (status, _) = app
        .call(Method::PUT, &review_uri, user, Some(json!({ "comment": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, review) = app
        .call(Method::PUT, &review_uri, user, Some(json!({ "comment": "Thank you!" })))
        .await;
    assert_eq!(status, StatusCode::OK, "{review}");
    assert_eq!(review["reply_comment"], "Thank you!");

    let (_, dashboard) = app.call(Method::GET, "/api/dashboard", user, None).await;
    assert_eq!(dashboard["accounts"], 1);
    assert_eq!(dashboard["locations"], 1);
    assert_eq!(dashboard["reviews"]["total"], 1);
    assert_eq!(dashboard["reviews"]["unreplied"], 0);
    assert_eq!(dashboard["last_sync"]["job_type"], "full");

    let (status, jobs) = app.call(Method::GET, "/api/sync/jobs?limit=500", user, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jobs.as_array().unwrap().len(), 2);

    let (status, _) = app
        .call(Method::GET, &format!("/api/sync/jobs/{}", Uuid::new_v4()), user, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_oauth_unconfigured_is_unavailable() {
    let app = TestApp::new(false).await;
    let (status, _) = app
        .call(Method::GET, "/api/oauth/google/authorize", Uuid::new_v4(), None)
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_oauth_link_flow_stores_credential_and_discovers_accounts() {
    let app = TestApp::new(true).await;
    mount_google_business(&app.google).await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "user-access-token",
            "expires_in": 3599,
            "refresh_token": "user-refresh-token",
            "scope": "https://www.googleapis.com/auth/business.manage"
        })))
        .mount(&app.google)
        .await;
    let user = Uuid::new_v4();

    let (status, body) = app
        .call(Method::GET, "/api/oauth/google/authorize", user, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let url = body["url"].as_str().unwrap();
    assert!(url.starts_with(&format!("{}/o/oauth2/auth?", app.google.uri())));
    assert!(url.contains("client_id=client-id"));
    assert!(url.contains("access_type=offline"));
    let state = url
        .split("state=")
        .nth(1)
        .and_then(|rest| rest.split('&').next())
        .unwrap()
        .to_string();

    // A state minted for someone else is refused.
    let (status, _) = app
        .call(
            Method::GET,
            &format!("/api/oauth/google/callback?code=abc&state={state}"),
            Uuid::new_v4(),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, linked) = app
        .call(
            Method::GET,
            &format!("/api/oauth/google/callback?code=abc&state={state}"),
            user,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{linked}");
    assert_eq!(
        linked["credential"]["scope"],
        "https://www.googleapis.com/auth/business.manage"
    );
    assert!(linked["credential"].get("refresh_token").is_none());
    assert_eq!(linked["sync_job"]["status"], "succeeded");

    let (_, accounts) = app.call(Method::GET, "/api/accounts", user, None).await;
    assert_eq!(accounts[0]["credential_id"], linked["credential"]["id"]);

    let (_, credentials) = app
        .call(Method::GET, "/api/oauth/google/credentials", user, None)
        .await;
    assert_eq!(credentials.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ai_generate_falls_back_without_providers() {
    let app = TestApp::new(false).await;
    let user = Uuid::new_v4();

    let (status, body) = app
        .call(
            Method::POST,
            "/api/ai/generate",
            user,
            Some(json!({
                "kind": "review_reply",
                "context": { "business_name": "Corner Bakery", "reviewer_name": "Sam", "star_rating": 5 }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fallback"], true);
    assert!(body["provider"].is_null());
    assert!(!body["text"].as_str().unwrap().is_empty());

    let (status, _) = app
        .call(
            Method::POST,
            "/api/ai/generate",
            user,
            Some(json!({ "kind": "post", "context": { "star_rating": 9 } })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, providers) = app.call(Method::GET, "/api/ai/providers", user, None).await;
    assert_eq!(providers["providers"], json!([]));
}
