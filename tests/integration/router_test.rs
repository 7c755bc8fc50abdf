use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;
use url::Url;
use uuid::Uuid;

use virtual_key_server::config::Config;
use virtual_key_server::router;
use virtual_key_server::services::delivery::HttpTransport;
use virtual_key_server::state::AppState;
use virtual_key_server::store::PgKeyStore;

use crate::helpers::passes;

const DATABASE_URL: &str = "postgres://localhost:1/keys";

/// State over a pool that never connects, so only routing and the checks
/// that run before the database are exercised.
fn offline_state() -> AppState {
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(100))
        .connect_lazy(DATABASE_URL)
        .unwrap();
    let config = Config {
        database_url: DATABASE_URL.to_string(),
        server_port: 3000,
        database_max_connections: 1,
        pass_base_url: Url::parse("https://passes.test/").unwrap(),
        pass_signing_secret: Some("test-secret".to_string()),
        hotel_name: "Grand Test Hotel".to_string(),
        delivery_api_url: None,
        delivery_api_key: None,
        delivery_timeout_secs: 1,
    };

    AppState {
        store: PgKeyStore::new(pool),
        transport: HttpTransport::new(None, None, Duration::from_secs(1)).unwrap(),
        passes: passes(),
        config: Arc::new(config),
    }
}

async fn send(request: Request<Body>) -> (StatusCode, Value) {
    let app = router(offline_state());
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn error_code(body: &Value) -> &str {
    body["error"]["code"].as_str().unwrap_or_default()
}

#[tokio::test]
async fn should_reject_key_routes_without_a_token() {
    let id = Uuid::new_v4();
    let requests = [
        ("POST", "/api/v1/keys".to_string()),
        ("GET", "/api/v1/keys".to_string()),
        ("GET", format!("/api/v1/keys/{id}")),
        ("PATCH", format!("/api/v1/keys/{id}/activate")),
        ("POST", format!("/api/v1/keys/{id}/regenerate")),
        ("POST", format!("/api/v1/keys/{id}/send-sms")),
        ("GET", format!("/api/v1/keys/{id}/access-events")),
    ];

    for (method, uri) in requests {
        let (status, body) = send(json_request(method, &uri, Value::Null)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(error_code(&body), "invalid_token", "{method} {uri}");
    }
}

#[tokio::test]
async fn should_reject_non_bearer_authorization() {
    let mut request = json_request("GET", "/api/v1/keys", Value::Null);
    let basic = "Basic dXNlcjpwYXNz".parse().unwrap();
    request.headers_mut().insert(header::AUTHORIZATION, basic);

    let (status, body) = send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "invalid_token");
}

#[tokio::test]
async fn should_reach_lock_verification_without_a_token() {
    let body = serde_json::json!({ "key_uuid": "x", "lock_id": " " });
    let request = json_request("POST", "/api/v1/verify/key", body);

    let (status, body) = send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "invalid_request");
}

#[tokio::test]
async fn should_serve_health_without_a_token() {
    let request = Request::get("/health").body(Body::empty()).unwrap();

    let (status, _) = send(request).await;

    // No database behind the pool, so the check itself fails.
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn should_not_find_unknown_routes() {
    let request = Request::get("/api/v1/rooms").body(Body::empty()).unwrap();

    let (status, _) = send(request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
