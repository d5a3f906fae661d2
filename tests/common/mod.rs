#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use futures::{stream, StreamExt};
use serde_json::json;

use expense_ai_ws::{
    config::Config,
    create_app_router,
    error::ModelError,
    models::ModelText,
    services::{ContentPart, GenerativeModel, TextStream},
    state::AppState,
};

pub const BOUNDARY: &str = "----expense-test-boundary";
pub const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

/// What the stub model answers with.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Chunks(Vec<String>),
    Fail(fn() -> ModelError),
    /// Streams the chunks, then fails.
    ChunksThenFail(Vec<String>, fn() -> ModelError),
}

/// Canned model that counts how often it is called.
pub struct StubModel {
    reply: Reply,
    calls: Arc<AtomicUsize>,
}

impl StubModel {
    pub fn new(reply: Reply) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                reply,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl GenerativeModel for StubModel {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, _parts: Vec<ContentPart>) -> Result<ModelText, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Text(text) => Ok(ModelText::new(text.clone())),
            Reply::Chunks(chunks) => Ok(ModelText::new(chunks.concat())),
            Reply::Fail(make) | Reply::ChunksThenFail(_, make) => Err(make()),
        }
    }

    async fn generate_stream(&self, _parts: Vec<ContentPart>) -> Result<TextStream, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Reply::Text(text) => Ok(stream::iter(vec![Ok(text.clone())]).boxed()),
            Reply::Chunks(chunks) => {
                Ok(stream::iter(chunks.clone().into_iter().map(Ok)).boxed())
            }
            Reply::Fail(make) => Err(make()),
            Reply::ChunksThenFail(chunks, make) => {
                let items = chunks
                    .clone()
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(make())))
                    .collect::<Vec<_>>();
                Ok(stream::iter(items).boxed())
            }
        }
    }
}

pub fn daily_quota_error() -> ModelError {
    ModelError::api(
        429,
        "Resource has been exhausted (e.g. check quota).",
        Some(json!([{
            "@type": "type.googleapis.com/google.rpc.QuotaFailure",
            "violations": [{ "quotaId": "GenerateRequestsPerDayPerProjectPerModel-FreeTier" }]
        }])),
    )
}

pub fn per_minute_error() -> ModelError {
    ModelError::api(
        429,
        "Resource has been exhausted (e.g. check quota).",
        Some(json!([{
            "@type": "type.googleapis.com/google.rpc.QuotaFailure",
            "violations": [{ "quotaId": "GenerateRequestsPerMinutePerProjectPerModel-FreeTier" }]
        }])),
    )
}

pub fn upstream_error() -> ModelError {
    ModelError::api(500, "Internal error encountered.", None)
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "GEMINI_API_KEY" => Some("test-key".to_string()),
        "STATIC_DIR" => Some(concat!(env!("CARGO_MANIFEST_DIR"), "/public").to_string()),
        _ => None,
    })
    .expect("test config")
}

pub fn setup_test_app(reply: Reply) -> (Router, Arc<AtomicUsize>) {
    let (model, calls) = StubModel::new(reply);
    let state = AppState::with_model(test_config(), Arc::new(model));
    (create_app_router(Arc::new(state)), calls)
}

/// Hand-built `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartBuilder {
    body: Vec<u8>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn receipt(self) -> Self {
        self.file("receiptImage", "receipt.png", "image/png", PNG)
    }

    pub fn into_request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .expect("request")
    }
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
