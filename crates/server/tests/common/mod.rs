//! Common test utilities for E2E testing with mock engines.
//!
//! This module provides a test fixture that creates an in-process server
//! backed by mock engine adapters, so the HTTP surface can be exercised
//! without ImageMagick, ffmpeg or pandoc installed.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use convertino_core::{
    testing::MockEngine, Config, EngineAdapter, EngineKind, Orchestrator, OrchestratorConfig, Registry,
};

const BOUNDARY: &str = "convertino-test-boundary";

/// Test fixture for E2E testing with mock engines.
///
/// Registers two engines:
/// - `image` (raster): png, jpg, webp; ico read-only
/// - `ffmpeg` (timed media): flac, mp3, wav
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upload() {
///     let fixture = TestFixture::new().await;
///     let response = fixture.upload("photo.png", b"png", "jpg").await;
///     assert_eq!(response.status, 201);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub orchestrator: Arc<Orchestrator>,
    pub image: Arc<MockEngine>,
    pub media: Arc<MockEngine>,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Bytes,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone, Default)]
pub struct TestConfig {
    /// Delay before media conversions complete
    pub media_delay: Option<Duration>,
    /// Makes every image conversion fail with this (kind, message)
    pub image_failure: Option<(String, String)>,
    /// Leaves a pandoc engine registered that never initializes
    pub broken_document_engine: bool,
}

impl TestConfig {
    /// Media conversions that run until cancelled.
    pub fn with_slow_media() -> Self {
        Self {
            media_delay: Some(Duration::from_secs(60)),
            ..Default::default()
        }
    }

    pub fn with_failing_images(kind: &str, message: &str) -> Self {
        Self {
            image_failure: Some((kind.to_string(), message.to_string())),
            ..Default::default()
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with default mocks.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let mut image = MockEngine::new("image", EngineKind::Raster)
            .with_format("png", true, true, true)
            .with_format("jpg", true, true, true)
            .with_format("webp", true, true, true)
            .with_format("ico", true, false, true)
            .succeed_with(b"converted-image");
        if let Some((kind, message)) = &test_config.image_failure {
            image = image.fail_with(kind, message);
        }

        let mut media = MockEngine::new("ffmpeg", EngineKind::TimedMedia)
            .with_format("flac", true, true, true)
            .with_format("mp3", true, true, true)
            .with_format("wav", true, true, true)
            .with_progress(vec![25.0, 50.0]);
        if let Some(delay) = test_config.media_delay {
            media = media.with_delay(delay);
        }

        let image = Arc::new(image);
        let media = Arc::new(media);
        let mut builder = Registry::builder()
            .register(Arc::clone(&image) as Arc<dyn EngineAdapter>)
            .register(Arc::clone(&media) as Arc<dyn EngineAdapter>);
        if test_config.broken_document_engine {
            builder = builder.register(Arc::new(
                MockEngine::new("pandoc", EngineKind::Document)
                    .with_format("docx", true, true, true)
                    .with_format("md", true, true, true)
                    .fail_init("pandoc not found"),
            ));
        }

        let mut config = Config::default();
        config.server.host = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
        config.server.port = 0; // Not used for in-process testing

        let orchestrator = Arc::new(Orchestrator::new(
            OrchestratorConfig::from(&config),
            Arc::new(builder.build()),
        ));
        orchestrator.initialize().await;

        let state = Arc::new(convertino_server::state::AppState::new(
            config,
            Arc::clone(&orchestrator),
        ));
        let router = convertino_server::api::create_router(state);

        Self {
            router,
            orchestrator,
            image,
            media,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request with no body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PATCH request with JSON body.
    pub async fn patch(&self, path: &str, body: Value) -> TestResponse {
        self.request("PATCH", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Upload a file through `POST /api/v1/files`.
    pub async fn upload(&self, file_name: &str, bytes: &[u8], to: &str) -> TestResponse {
        let body = multipart_body(Some((file_name, bytes)), Some(to));
        self.send_multipart(body).await
    }

    /// Send a multipart request built from optional parts.
    pub async fn send_multipart(&self, body: Vec<u8>) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/files")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// Polls a file until `done` accepts its JSON snapshot.
    pub async fn wait_for_file(&self, id: &str, done: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..200 {
            let response = self.get(&format!("/api/v1/files/{}", id)).await;
            if done(&response.body) {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("file {} never reached the expected state", id);
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }
}

/// Builds a `multipart/form-data` body with an optional file part and `to` field.
pub fn multipart_body(file: Option<(&str, &[u8])>, to: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((name, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(to) = to {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"to\"\r\n\r\n{}\r\n",
                BOUNDARY, to
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
