#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use assetflow_api::config::{SchedulerConfig, ServerConfig};
use assetflow_api::router::build_app_router;
use assetflow_api::state::AppState;

/// Endpoint used by the default test analyst.
pub const ANALYST: &str = "https://analyst-1:5000";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        log_json: false,
        scheduler: SchedulerConfig {
            host: "test-scheduler".to_string(),
            ..SchedulerConfig::default()
        },
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool. Same stack as `main.rs`.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

/// Send a request with optional JSON body and extra headers.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    headers: &[(&str, &str)],
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, None, &[]).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::POST, uri, Some(body), &[]).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, Method::PUT, uri, Some(body), &[]).await
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, None, &[]).await
}

/// POST as the analyst at `endpoint`.
pub async fn analyst_post(
    app: Router,
    endpoint: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Response<Body> {
    send(app, Method::POST, uri, body, &[("x-analyst-endpoint", endpoint)]).await
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Ping body for a healthy analyst.
pub fn ping_body() -> serde_json::Value {
    serde_json::json!({
        "total_ram_mb": 16384,
        "free_ram_mb": 8192,
        "free_disk_mb": 100000,
        "load": 0.5,
        "version": "1.0.0"
    })
}
