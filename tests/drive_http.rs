//! Drive HTTP client tests against an in-process fake Drive server.

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use async_trait::async_trait;
use axum::{Json, Router};
use gworkspace_core::access::FolderHierarchy;
use gworkspace_core::google::{
    AuthHandle, AuthProvider, Credentials, DriveClient, HttpDriveClient, StaticTokenProvider,
};
use gworkspace_core::resilience::{FixedJitter, RetryExecutor, UpstreamFailure};
use gworkspace_core::types::{DriveConfig, RetryConfig};
use gworkspace_core::Error;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "test-token";

#[derive(Clone, Default)]
struct FakeDrive {
    flaky_hits: Arc<AtomicU32>,
}

async fn get_file(
    State(state): State<FakeDrive>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if query.get("fields").map(String::as_str) != Some("parents") {
        return (StatusCode::BAD_REQUEST, "fields=parents required").into_response();
    }

    match id.as_str() {
        "T" => Json(json!({"parents": ["F"]})).into_response(),
        "F" => Json(json!({"parents": ["root"]})).into_response(),
        "top" => Json(json!({})).into_response(),
        "limited" => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "3")],
            Json(json!({"error": {
                "code": 429,
                "message": "Rate Limit Exceeded",
                "errors": [{"message": "Rate Limit Exceeded", "domain": "usageLimits", "reason": "rateLimitExceeded"}]
            }})),
        )
            .into_response(),
        "flaky" => {
            if state.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            } else {
                Json(json!({"parents": ["F"]})).into_response()
            }
        }
        _ => (StatusCode::NOT_FOUND, "nope").into_response(),
    }
}

/// Spin up the fake server on a random port; returns its base URL.
async fn start_fake_drive(state: FakeDrive) -> String {
    let app = Router::new()
        .route("/drive/v3/files/{id}", get(get_file))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{addr}")
}

fn client(base_url: String, token: &str) -> HttpDriveClient {
    client_with_auth(base_url, AuthHandle::new(Arc::new(StaticTokenProvider::new(token))))
}

fn client_with_auth(base_url: String, auth: AuthHandle) -> HttpDriveClient {
    let config = DriveConfig {
        base_url,
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(1),
    };
    HttpDriveClient::new(&config, auth).unwrap()
}

/// Token endpoint that is always down.
#[derive(Default)]
struct BrokenTokenEndpoint {
    calls: AtomicU32,
}

#[async_trait]
impl AuthProvider for BrokenTokenEndpoint {
    async fn authenticate(&self) -> gworkspace_core::Result<Credentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::auth("token endpoint returned 503"))
    }
}

fn instant_retry() -> RetryExecutor {
    RetryExecutor::new(RetryConfig {
        base_delay_ms: 0,
        max_delay_ms: 0,
        ..RetryConfig::default()
    })
    .with_jitter(FixedJitter(0.0))
}

#[tokio::test]
async fn test_parents_success() {
    let base = start_fake_drive(FakeDrive::default()).await;
    let drive = client(base, TOKEN);

    assert_eq!(drive.parents("T").await.unwrap(), vec!["F".to_string()]);
    assert!(drive.parents("top").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after_and_reason() {
    let base = start_fake_drive(FakeDrive::default()).await;
    let failure = client(base, TOKEN).parents("limited").await.unwrap_err();

    assert_eq!(failure.status, Some(429));
    assert_eq!(failure.retry_after, Some(Duration::from_secs(3)));

    let n = failure.normalized();
    assert_eq!(n.http_status, 429);
    assert_eq!(n.reason.as_deref(), Some("rateLimitExceeded"));
    assert!(n.is_retryable);
}

#[tokio::test]
async fn test_plain_text_error_body() {
    let base = start_fake_drive(FakeDrive::default()).await;
    let failure = client(base, TOKEN).parents("unknown").await.unwrap_err();

    assert_eq!(failure.status, Some(404));
    assert_eq!(failure.body, Some(Value::String("nope".to_string())));
    let n = failure.normalized();
    assert_eq!(n.http_status, 404);
    assert!(!n.is_retryable);
}

#[tokio::test]
async fn test_bad_token_is_unauthorized() {
    let base = start_fake_drive(FakeDrive::default()).await;
    let failure = client(base, "wrong").parents("T").await.unwrap_err();
    assert_eq!(failure.status, Some(401));
    assert!(!failure.normalized().is_retryable);
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let failure = client(format!("http://{addr}"), TOKEN)
        .parents("T")
        .await
        .unwrap_err();

    assert_eq!(failure.status, None);
    assert!(failure.transient);
    assert_eq!(failure.retryable_override(), Some(true));
}

#[tokio::test]
async fn test_hierarchy_walk_over_http_retries_503() {
    let state = FakeDrive::default();
    let base = start_fake_drive(state.clone()).await;
    let hierarchy = FolderHierarchy::new(Arc::new(client(base, TOKEN))).with_retry(instant_retry());

    assert!(hierarchy.is_within_folder_hierarchy("T", "F").await.unwrap());
    assert!(hierarchy.is_within_folder_hierarchy("flaky", "F").await.unwrap());
    assert_eq!(state.flaky_hits.load(Ordering::SeqCst), 2);
    assert!(!hierarchy.is_within_folder_hierarchy("top", "F").await.unwrap());
}

#[tokio::test]
async fn test_auth_failure_is_not_retried_and_keeps_its_code() {
    let base = start_fake_drive(FakeDrive::default()).await;
    let provider = Arc::new(BrokenTokenEndpoint::default());
    let drive = client_with_auth(base, AuthHandle::new(provider.clone()));

    let failure = drive.parents("T").await.unwrap_err();
    assert!(failure.auth);
    assert_eq!(failure.status, None);
    assert_eq!(failure.retryable_override(), Some(false));

    let hierarchy = FolderHierarchy::new(Arc::new(drive)).with_retry(instant_retry());
    let err = hierarchy.is_within_folder_hierarchy("T", "F").await.unwrap_err();

    assert_eq!(err.code(), "AUTH_ERROR");
    assert_eq!(err.to_string(), "auth error: token endpoint returned 503");
    // One direct call plus one walk attempt.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}
