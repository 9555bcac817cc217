#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use invoice_ml_server::{
    build_router,
    config::AppConfig,
    db,
    ocr::{PlaceholderTextExtractor, TextExtractor},
    AppState,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "invoice-ml-test-boundary";

/// Application over a fresh in-memory SQLite database with uploads and model
/// artifacts kept in a temporary directory.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub workdir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_threshold(100).await
    }

    pub async fn with_threshold(training_threshold: u64) -> Self {
        Self::build(training_threshold, Arc::new(PlaceholderTextExtractor)).await
    }

    pub async fn with_extractor(extractor: Arc<dyn TextExtractor>) -> Self {
        Self::build(100, extractor).await
    }

    async fn build(training_threshold: u64, extractor: Arc<dyn TextExtractor>) -> Self {
        let workdir = tempfile::tempdir().expect("failed to create temp dir");

        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        cfg.media_root = workdir.path().join("media");
        cfg.model_dir = workdir.path().join("models");
        cfg.training_threshold = training_threshold;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::with_text_extractor(Arc::new(pool), cfg, extractor);
        let router = build_router(state.clone()).expect("failed to build router");

        Self {
            router,
            state,
            workdir,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("failed to build request");
        self.send(request).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(body)).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    /// Posts one multipart part named `field` to `/upload`.
    pub async fn upload_file(&self, field: &str, file_name: &str, content: &[u8]) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, file_name, content)))
            .expect("failed to build upload request");
        self.send(request).await
    }

    /// Uploads the sample invoice and returns the created invoice id.
    pub async fn upload_sample(&self) -> String {
        let (status, body) = self
            .upload_file("file", "facture.pdf", b"%PDF-1.4 sample")
            .await;
        assert_eq!(status, StatusCode::CREATED, "upload failed: {body}");
        body["invoice"]["id"]
            .as_str()
            .expect("upload response carries an invoice id")
            .to_string()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

pub fn multipart_body(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Reads a decimal that may be serialized as a string or a number.
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn assert_amount(value: &Value, expected: f64) {
    let actual = as_f64(value).unwrap_or_else(|| panic!("not an amount: {value}"));
    assert!(
        (actual - expected).abs() < 1e-6,
        "expected {expected}, got {actual}"
    );
}
