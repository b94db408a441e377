//! API integration tests.
//!
//! Drives the full router (auth, CORS, handlers) over an in-memory event store
//! and a scripted metadata registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::{Value, json};
use tower::ServiceExt;

use datapulse_core::{CandidateStat, DatasetMetadata, Event, EventKind, NO_DESCRIPTION};
use datapulse_serve::{
    AppState, Config, EventStore, LookupError, MemoryStore, MetadataSource, StoreError, router,
};

const SECRET: &str = "test-secret";
const ORIGIN: &str = "https://portal.example.org";

fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        secret_key: SECRET.to_string(),
        clickhouse_url: "http://localhost:8123".to_string(),
        clickhouse_database: "default".to_string(),
        clickhouse_user: None,
        clickhouse_password: None,
        cors_origin: Some(ORIGIN.to_string()),
        registry_url: "http://registry.invalid".to_string(),
        registry_timeout: Duration::from_secs(1),
        metrics_port: None,
    }
}

/// Registry double: answers from a fixed table, records every lookup.
#[derive(Default)]
struct FakeRegistry {
    known: HashMap<String, DatasetMetadata>,
    calls: Mutex<Vec<String>>,
}

impl FakeRegistry {
    fn with(mut self, id: &str, title: &str, description: Option<&str>) -> Self {
        self.known.insert(
            id.to_string(),
            DatasetMetadata {
                title: Some(title.to_string()),
                publisher: Some("Registry Org".to_string()),
                description: description.map(String::from),
            },
        );
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataSource for FakeRegistry {
    async fn lookup(&self, dataset_id: &str) -> Result<DatasetMetadata, LookupError> {
        self.calls.lock().unwrap().push(dataset_id.to_string());
        self.known
            .get(dataset_id)
            .cloned()
            .ok_or(LookupError::NotFound)
    }
}

/// Store whose every statement fails.
struct BrokenStore;

#[async_trait]
impl EventStore for BrokenStore {
    async fn insert_event(&self, _event: &Event) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn insert_events(&self, _events: &[Event]) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn top_candidates(&self, _limit: usize) -> Result<Vec<CandidateStat>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

struct Harness {
    router: axum::Router,
    store: Arc<MemoryStore>,
    registry: Arc<FakeRegistry>,
}

fn harness(registry: FakeRegistry) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(registry);
    let state = AppState::new(test_config(), store.clone(), registry.clone());
    Harness {
        router: router(state),
        store,
        registry,
    }
}

fn broken_router() -> axum::Router {
    router(AppState::new(
        test_config(),
        Arc::new(BrokenStore),
        Arc::new(FakeRegistry::default()),
    ))
}

mod helpers {
    use super::*;

    pub fn request(
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<Value>,
    ) -> Result<Request<Body>> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = auth {
            builder = builder.header(header::AUTHORIZATION, token);
        }
        let body = match body {
            Some(v) => Body::from(serde_json::to_vec(&v).context("serialize request body")?),
            None => Body::empty(),
        };
        builder.body(body).context("build request")
    }

    pub async fn send(router: axum::Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = router.oneshot(request).await.map_err(|err| match err {})?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 256 * 1024)
            .await
            .context("read response body")?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).context("parse response json")?
        };
        Ok((status, value))
    }

    pub async fn post(
        router: axum::Router,
        uri: &str,
        body: Value,
    ) -> Result<(StatusCode, Value)> {
        let bearer = format!("Bearer {SECRET}");
        send(router, request(Method::POST, uri, Some(&bearer), Some(body))?).await
    }

    pub async fn get(router: axum::Router, uri: &str) -> Result<(StatusCode, Value)> {
        send(router, request(Method::GET, uri, None, None)?).await
    }

    pub async fn log(router: axum::Router, kind: EventKind, id: &str, times: usize) -> Result<()> {
        let uri = match kind {
            EventKind::View => "/log-dataset-view",
            EventKind::Download => "/log-dataset-download",
        };
        for _ in 0..times {
            let (status, _) = post(router.clone(), uri, json!({ "datasetId": id })).await?;
            assert_eq!(status, StatusCode::OK);
        }
        Ok(())
    }
}

// ============================================================================
// Logging endpoints
// ============================================================================

#[tokio::test]
async fn log_view_records_event() -> Result<()> {
    let h = harness(FakeRegistry::default());

    let (status, body) =
        helpers::post(h.router.clone(), "/log-dataset-view", json!({"datasetId": "ds-1"})).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["log"]["eventType"], json!("view"));
    assert_eq!(body["log"]["datasetId"], json!("ds-1"));
    assert!(body["log"]["timestamp"].as_str().is_some_and(|t| t.ends_with('Z')));

    let events = h.store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_kind, EventKind::View);
    Ok(())
}

#[tokio::test]
async fn log_download_records_event() -> Result<()> {
    let h = harness(FakeRegistry::default());

    let (status, body) = helpers::post(
        h.router.clone(),
        "/log-dataset-download",
        json!({"datasetId": "ds-2"}),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["log"]["eventType"], json!("download"));
    assert_eq!(h.store.events()[0].event_kind, EventKind::Download);
    Ok(())
}

#[tokio::test]
async fn log_without_dataset_id_is_rejected() -> Result<()> {
    let h = harness(FakeRegistry::default());

    for body in [json!({}), json!({"datasetId": ""}), json!({"datasetId": "   "})] {
        let (status, resp) = helpers::post(h.router.clone(), "/log-dataset-view", body).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp, json!({"error": "Dataset ID is required"}));
    }

    assert!(h.store.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn log_with_unreadable_body_is_rejected() -> Result<()> {
    let h = harness(FakeRegistry::default());
    let request = Request::builder()
        .method(Method::POST)
        .uri("/log-dataset-download")
        .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))?;

    let (status, resp) = helpers::send(h.router.clone(), request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp, json!({"error": "Dataset ID is required"}));
    assert!(h.store.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn log_storage_failure_is_generic_500() -> Result<()> {
    let (status, body) =
        helpers::post(broken_router(), "/log-dataset-view", json!({"datasetId": "x"})).await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Internal Server Error"}));
    Ok(())
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn mutating_routes_require_secret() -> Result<()> {
    let h = harness(FakeRegistry::default());

    let bad_headers = [
        None,
        Some("Bearer wrong-secret".to_string()),
        Some(SECRET.to_string()),
        Some(format!("Basic {SECRET}")),
        Some(format!("Bearer {SECRET}x")),
    ];

    for uri in ["/log-dataset-view", "/log-dataset-download", "/insert-json", "/ping"] {
        for auth in &bad_headers {
            let method = if uri == "/ping" { Method::GET } else { Method::POST };
            let request =
                helpers::request(method, uri, auth.as_deref(), Some(json!({"datasetId": "x"})))?;
            let (status, body) = helpers::send(h.router.clone(), request).await?;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri} with {auth:?}");
            assert_eq!(body, json!({"error": "Unauthorized"}));
        }
    }

    assert!(h.store.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn auth_is_checked_before_validation() -> Result<()> {
    let h = harness(FakeRegistry::default());

    // Missing datasetId would be a 400, but the missing secret wins.
    let request = helpers::request(Method::POST, "/log-dataset-view", None, Some(json!({})))?;
    let (status, _) = helpers::send(h.router.clone(), request).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn ping_accepts_valid_secret() -> Result<()> {
    let h = harness(FakeRegistry::default());
    let bearer = format!("Bearer {SECRET}");
    let request = helpers::request(Method::GET, "/ping", Some(&bearer), None)?;
    let (status, body) = helpers::send(h.router.clone(), request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"message": "pong"}));
    Ok(())
}

#[tokio::test]
async fn preflight_bypasses_auth() -> Result<()> {
    let h = harness(FakeRegistry::default());
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/log-dataset-view")
        .header(header::ORIGIN, ORIGIN)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            "content-type,authorization",
        )
        .body(Body::empty())?;

    let response = h.router.clone().oneshot(request).await.map_err(|err| match err {})?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
        Some(&header::HeaderValue::from_static(ORIGIN))
    );
    let methods = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(methods.contains("POST"));
    assert!(methods.contains("GET"));
    Ok(())
}

#[tokio::test]
async fn other_origins_are_not_allowed() -> Result<()> {
    let h = harness(FakeRegistry::default());
    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/datasets")
        .header(header::ORIGIN, "https://elsewhere.example.com")
        .body(Body::empty())?;

    let response = h.router.clone().oneshot(request).await.map_err(|err| match err {})?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
    Ok(())
}

// ============================================================================
// Bulk insert
// ============================================================================

#[tokio::test]
async fn insert_json_inserts_all_entries() -> Result<()> {
    let h = harness(FakeRegistry::default());

    let (status, body) = helpers::post(
        h.router.clone(),
        "/insert-json",
        json!({"logs": [
            {"eventType": "view", "datasetId": "a", "timestamp": "2024-05-01T10:00:00Z"},
            {"eventType": "download", "datasetId": "a", "timestamp": "2024-05-01T10:01:00.250Z"},
            {"eventType": "view", "datasetId": "b", "timestamp": "2024-05-02T08:00:00+02:00"},
        ]}),
    )
    .await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "inserted": 3}));

    let events = h.store.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].event_kind, EventKind::Download);
    assert_eq!(events[2].timestamp.to_rfc3339(), "2024-05-02T06:00:00+00:00");
    Ok(())
}

#[tokio::test]
async fn insert_json_is_all_or_nothing() -> Result<()> {
    let h = harness(FakeRegistry::default());

    let (status, body) = helpers::post(
        h.router.clone(),
        "/insert-json",
        json!({"logs": [
            {"eventType": "view", "datasetId": "a", "timestamp": "2024-05-01T10:00:00Z"},
            {"eventType": "view'); DROP TABLE dataset_events; --", "datasetId": "a", "timestamp": "2024-05-01T10:00:00Z"},
        ]}),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["error"].as_str().unwrap_or_default();
    assert!(message.starts_with("Invalid log entry at index 1"), "{message}");
    assert!(h.store.events().is_empty());
    Ok(())
}

#[tokio::test]
async fn insert_json_rejects_missing_or_empty_logs() -> Result<()> {
    let h = harness(FakeRegistry::default());

    for body in [json!({}), json!({"logs": []})] {
        let (status, resp) = helpers::post(h.router.clone(), "/insert-json", body).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(resp, json!({"error": "Logs array is required"}));
    }

    let (status, resp) =
        helpers::post(h.router.clone(), "/insert-json", json!({"logs": "nope"})).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp, json!({"error": "Invalid request body"}));
    Ok(())
}

#[tokio::test]
async fn insert_json_storage_failure_is_500() -> Result<()> {
    let (status, body) = helpers::post(
        broken_router(),
        "/insert-json",
        json!({"logs": [{"eventType": "view", "datasetId": "a", "timestamp": "2024-05-01T10:00:00Z"}]}),
    )
    .await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Internal Server Error"}));
    Ok(())
}

// ============================================================================
// Ranking endpoint
// ============================================================================

#[tokio::test]
async fn datasets_empty_store_returns_empty_without_lookups() -> Result<()> {
    let h = harness(FakeRegistry::default());

    let request = helpers::request(Method::GET, "/api/datasets", None, None)?;
    let response = h.router.clone().oneshot(request).await.map_err(|err| match err {})?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL),
        Some(&header::HeaderValue::from_static("no-store"))
    );

    let (status, body) = helpers::get(h.router.clone(), "/api/datasets").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    assert!(h.registry.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn datasets_are_ranked_and_enriched() -> Result<()> {
    let h = harness(
        FakeRegistry::default()
            .with("popular", "Popular", Some("Line one.\nLine two.\nLine three."))
            .with("steady", "Steady", None),
    );

    helpers::log(h.router.clone(), EventKind::View, "steady", 3).await?;
    helpers::log(h.router.clone(), EventKind::Download, "popular", 3).await?;
    helpers::log(h.router.clone(), EventKind::View, "popular", 1).await?;

    let (status, body) = helpers::get(h.router.clone(), "/api/datasets").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {
                "id": "popular",
                "views": 1,
                "downloads": 3,
                "title": "Popular",
                "publisher": "Registry Org",
                "description": "Line one. Line two."
            },
            {
                "id": "steady",
                "views": 3,
                "downloads": 0,
                "title": "Steady",
                "publisher": "Registry Org",
                "description": NO_DESCRIPTION
            }
        ])
    );
    Ok(())
}

#[tokio::test]
async fn datasets_cap_at_six_and_skip_unknown() -> Result<()> {
    let mut registry = FakeRegistry::default();
    for i in 0..10 {
        // Every third dataset is unknown to the registry.
        if i % 3 != 1 {
            registry = registry.with(&format!("ds-{i}"), &format!("Dataset {i}"), None);
        }
    }
    let h = harness(registry);

    for i in 0..10 {
        helpers::log(h.router.clone(), EventKind::Download, &format!("ds-{i}"), 20 - i).await?;
    }

    let (status, body) = helpers::get(h.router.clone(), "/api/datasets").await?;
    assert_eq!(status, StatusCode::OK);

    let ids: Vec<&str> = body
        .as_array()
        .context("array response")?
        .iter()
        .filter_map(|d| d["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["ds-0", "ds-2", "ds-3", "ds-5", "ds-6", "ds-8"]);

    // ds-9 is never looked up once the quota is met.
    let calls = h.registry.calls();
    assert_eq!(calls.len(), 9);
    assert!(!calls.contains(&"ds-9".to_string()));
    Ok(())
}

#[tokio::test]
async fn datasets_all_lookups_failing_returns_empty() -> Result<()> {
    let h = harness(FakeRegistry::default());
    helpers::log(h.router.clone(), EventKind::View, "ghost", 2).await?;

    let (status, body) = helpers::get(h.router.clone(), "/api/datasets").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    assert_eq!(h.registry.calls(), vec!["ghost".to_string()]);
    Ok(())
}

#[tokio::test]
async fn datasets_storage_failure_is_500() -> Result<()> {
    let (status, body) = helpers::get(broken_router(), "/api/datasets").await?;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "Internal Server Error"}));
    Ok(())
}

#[tokio::test]
async fn health_is_public() -> Result<()> {
    let h = harness(FakeRegistry::default());
    let (status, body) = helpers::get(h.router.clone(), "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    Ok(())
}
