//! Gemini REST client (`generateContent` / `streamGenerateContent`).

use std::collections::VecDeque;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::GeminiConfig;
use crate::error::ModelError;
use crate::models::ModelText;
use crate::services::model::{ContentPart, GenerativeModel, TextStream};
use crate::services::sse::SseDecoder;

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
}

#[derive(Serialize)]
struct RequestContent {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text { text: String },
    InlineData { inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<u16>,
    #[serde(default)]
    message: String,
    status: Option<String>,
    details: Option<Value>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> Result<String, ModelError> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
        {
            return Err(ModelError::Blocked {
                reason: reason.clone(),
            });
        }

        let Some(candidate) = self.candidates.first() else {
            return Ok(String::new());
        };
        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason == "SAFETY" {
                return Err(ModelError::Blocked {
                    reason: reason.to_string(),
                });
            }
        }

        Ok(candidate
            .content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

impl ApiErrorBody {
    fn into_model_error(self, http_status: u16) -> ModelError {
        let message = match self.status {
            Some(status) if !self.message.is_empty() => format!("{} ({})", self.message, status),
            Some(status) => status,
            None => self.message,
        };
        ModelError::api(self.code.unwrap_or(http_status), message, self.details)
    }
}

// ============================================================================
// CLIENT
// ============================================================================

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, ModelError> {
        // Only a connect timeout: streamed reviews may legitimately take a while.
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.api_base_url.clone(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, self.model, method)
    }

    fn request_body(parts: Vec<ContentPart>) -> GenerateContentRequest {
        let parts = parts
            .into_iter()
            .map(|part| match part {
                ContentPart::Text(text) => RequestPart::Text { text },
                ContentPart::Image(image) => RequestPart::InlineData {
                    inline_data: InlineData {
                        mime_type: image.mime_type,
                        data: general_purpose::STANDARD.encode(&image.bytes),
                    },
                },
            })
            .collect();

        GenerateContentRequest {
            contents: vec![RequestContent {
                role: "user",
                parts,
            }],
        }
    }

    async fn post(
        &self,
        url: String,
        parts: Vec<ContentPart>,
    ) -> Result<reqwest::Response, ModelError> {
        let response = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&Self::request_body(parts))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, model = %self.model, "Gemini API error: {}", body);
        Err(error_from_body(status.as_u16(), &body))
    }
}

fn error_from_body(status: u16, body: &str) -> ModelError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.into_model_error(status),
        Err(_) => ModelError::api(status, body.trim().to_string(), None),
    }
}

/// Decodes one SSE payload into the text it carries. `Ok(None)` for events without text.
fn decode_stream_event(data: &str) -> Result<Option<String>, ModelError> {
    let value: Value = serde_json::from_str(data)
        .map_err(|e| ModelError::Decode(format!("stream event is not JSON: {}", e)))?;

    if let Some(error) = value.get("error") {
        let body: ApiErrorBody = serde_json::from_value(error.clone())
            .map_err(|e| ModelError::Decode(format!("unreadable stream error: {}", e)))?;
        return Err(body.into_model_error(500));
    }

    let response: GenerateContentResponse = serde_json::from_value(value)
        .map_err(|e| ModelError::Decode(format!("unexpected stream event: {}", e)))?;
    let text = response.text()?;
    Ok(if text.is_empty() { None } else { Some(text) })
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    exhausted: bool,
}

/// Turns an SSE response body into a stream of text chunks, in order.
/// The stream ends after the first error.
fn text_stream(response: reqwest::Response) -> TextStream {
    let state = StreamState {
        body: response.bytes_stream().boxed(),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            if let Some(data) = state.pending.pop_front() {
                match decode_stream_event(&data) {
                    Ok(Some(text)) => return Some((Ok(text), Some(state))),
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), None)),
                }
            }

            if state.exhausted {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => match state.decoder.push(&chunk) {
                    Ok(events) => state.pending.extend(events),
                    Err(e) => return Some((Err(e), None)),
                },
                Some(Err(e)) => return Some((Err(ModelError::Http(e)), None)),
                None => {
                    state.exhausted = true;
                    if let Some(last) = state.decoder.finish() {
                        state.pending.push_back(last);
                    }
                }
            }
        }
    })
    .boxed()
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, parts: Vec<ContentPart>) -> Result<ModelText, ModelError> {
        debug!(model = %self.model, "📤 Calling Gemini generateContent");
        let response = self.post(self.endpoint("generateContent"), parts).await?;

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;
        let text = body.text()?;

        info!(model = %self.model, chars = text.chars().count(), "✅ Gemini reply received");
        Ok(ModelText::new(text))
    }

    async fn generate_stream(&self, parts: Vec<ContentPart>) -> Result<TextStream, ModelError> {
        debug!(model = %self.model, "📤 Calling Gemini streamGenerateContent");
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.post(url, parts).await?;
        Ok(text_stream(response))
    }
}
