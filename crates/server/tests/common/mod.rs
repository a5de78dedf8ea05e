//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! with mock collaborators injected, so whole jobs can run through the HTTP
//! surface without external services.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use briefsmith_core::{
    extract::FileTextExtractor,
    generate::{GenerationConfig, SectionGenerator},
    render::MarkdownRenderer,
    template::{InMemoryTemplateStore, TemplateProvider},
    testing::{MockLlmClient, MockSpeechApi, MockStager, MockUploader},
    transcribe::{TranscriptionChain, TranscriptionConfig},
    Config, JobRegistry, PipelineDriver, PipelineServices,
};
use briefsmith_server::{create_router, AppState};

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use briefsmith_core::testing::fixtures;

const BOUNDARY: &str = "briefsmith-test-boundary";

/// Test fixture for API testing with mock collaborators.
///
/// Provides an in-process router with controllable mocks for:
/// - Section generation (MockLlmClient)
/// - Speech recognition (MockSpeechApi)
/// - Document upload (MockUploader)
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    pub llm: Arc<MockLlmClient>,
    #[allow(dead_code)]
    pub speech: Arc<MockSpeechApi>,
    pub uploader: Arc<MockUploader>,
    #[allow(dead_code)]
    pub templates: Arc<InMemoryTemplateStore>,
    /// Root of per-job workspaces
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// One part of a multipart submission.
pub enum FormPart<'a> {
    File { name: &'a str, bytes: &'a [u8] },
    Text { field: &'a str, value: &'a str },
}

impl TestFixture {
    /// Create a new test fixture with default configuration.
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(mut config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        config.pipeline.temp_dir = temp_dir.path().to_path_buf();

        let llm = Arc::new(MockLlmClient::new());
        let speech = Arc::new(MockSpeechApi::new());
        let stager = Arc::new(MockStager::new());
        let uploader = Arc::new(MockUploader::new());
        let templates = Arc::new(InMemoryTemplateStore::new());

        let mut transcription = TranscriptionConfig::default();
        transcription.long_running.poll_interval_ms = 1;
        let transcriber = TranscriptionChain::from_config(&transcription, speech.clone(), stager)
            .expect("Failed to build transcription chain");

        let generation = GenerationConfig {
            models: vec!["mock-model".to_string()],
            ..GenerationConfig::default()
        };

        let template_provider: Arc<dyn TemplateProvider> = templates.clone();
        let services = PipelineServices {
            extractor: Arc::new(FileTextExtractor::new()),
            transcriber: Arc::new(transcriber),
            generator: Arc::new(SectionGenerator::new(llm.clone(), &generation)),
            templates: Arc::clone(&template_provider),
            renderer: Arc::new(MarkdownRenderer::new()),
            uploader: uploader.clone(),
        };
        let driver = PipelineDriver::new(
            config.pipeline.clone(),
            Arc::new(JobRegistry::new()),
            services,
        );
        let state = Arc::new(AppState::new(config, driver, template_provider));

        Self {
            router: create_router(state),
            llm,
            speech,
            uploader,
            templates,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Send a GET request with extra headers.
    #[allow(dead_code)]
    pub async fn get_with(&self, path: &str, headers: &[(&str, &str)]) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Send a GET request and return the raw body text.
    #[allow(dead_code)]
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a PUT request with JSON body.
    #[allow(dead_code)]
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        let request = Request::builder()
            .method("PUT")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        self.send(request).await
    }

    /// Submit a multipart form to `/api/v1/jobs` with extra headers.
    pub async fn submit(&self, parts: &[FormPart<'_>], headers: &[(&str, &str)]) -> TestResponse {
        self.post_form("/api/v1/jobs", parts, headers).await
    }

    /// POST a multipart form to `path` with extra headers.
    pub async fn post_form(
        &self,
        path: &str,
        parts: &[FormPart<'_>],
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(multipart_body(parts))).unwrap();
        self.send(request).await
    }

    /// Submit a single file with no extra parts or headers.
    pub async fn submit_file(&self, name: &str, bytes: &[u8]) -> TestResponse {
        self.submit(&[FormPart::File { name, bytes }], &[]).await
    }

    /// Polls the status endpoint until the job is terminal.
    pub async fn wait_for_terminal(&self, job_id: &str) -> Value {
        for _ in 0..500 {
            let response = self.get(&format!("/api/v1/jobs/{}", job_id)).await;
            assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);
            let state = response.body["state"].as_str().unwrap_or("").to_string();
            if state == "completed" || state == "failed" {
                return response.body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} did not finish", job_id);
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            FormPart::File { name, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            FormPart::Text { field, value } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}",
                        field, value
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}
