//! Shared test helpers for HTTP integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use threadline_conversation::generation::EchoGenerator;
use threadline_server::config::AppConfig;
use threadline_server::routes;
use threadline_server::runtime::{Runtime, RuntimeDeps};
use threadline_store::MemoryDomainRepository;
use threadline_test_support::{FixedClock, RecordingPublisher, SequentialIds};
use tower::ServiceExt;

/// A running pipeline over the in-memory store with its router.
pub struct TestApp {
    pub app: Router,
    pub runtime: Runtime,
    pub repo: Arc<MemoryDomainRepository>,
    pub publisher: Arc<RecordingPublisher>,
}

/// Starts the pipeline with deterministic clock and ids, an echo generator
/// and a recording publisher in place of Redis.
pub fn spawn_app() -> TestApp {
    let config = AppConfig::from_lookup(|name| match name {
        "STORE_BACKEND" => Some("memory".to_owned()),
        "PARTITIONS" => Some("2".to_owned()),
        "OUTBOX_SWEEP_INTERVAL_MS" => Some("60000".to_owned()),
        _ => None,
    })
    .unwrap();
    let repo = Arc::new(MemoryDomainRepository::new());
    let publisher = Arc::new(RecordingPublisher::new());

    let runtime = Runtime::start(
        &config,
        RuntimeDeps {
            repository: repo.clone(),
            outbox_store: repo.clone(),
            publisher: publisher.clone(),
            generator: Arc::new(EchoGenerator),
            clock: Arc::new(FixedClock::at_millis(1_000)),
            ids: Arc::new(SequentialIds::default()),
        },
    );
    let app = routes::router(runtime.state());

    TestApp {
        app,
        runtime,
        repo,
        publisher,
    }
}

/// Send a POST request with a raw body and return the response.
pub async fn post_raw(app: Router, uri: &str, body: Vec<u8>) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post_raw(app, uri, serde_json::to_vec(body).unwrap()).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
