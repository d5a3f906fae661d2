//! Generative model abstraction.
//!
//! Handlers only see [`GenerativeModel`]; the Gemini implementation lives in
//! [`crate::services::gemini_client`] and tests plug in stubs.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ModelError;
use crate::models::{ModelText, ReceiptImage};

/// Incremental text produced by a streamed generation, in arrival order.
pub type TextStream = BoxStream<'static, Result<String, ModelError>>;

/// One element of a multimodal prompt.
#[derive(Debug, Clone)]
pub enum ContentPart {
    Text(String),
    Image(ReceiptImage),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(text.into())
    }

    pub fn image(image: &ReceiptImage) -> Self {
        ContentPart::Image(image.clone())
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    /// Single-shot generation returning the whole reply.
    async fn generate(&self, parts: Vec<ContentPart>) -> Result<ModelText, ModelError>;

    /// Streamed generation. Errors before the stream opens are returned
    /// directly; later failures arrive as stream items.
    async fn generate_stream(&self, parts: Vec<ContentPart>) -> Result<TextStream, ModelError>;
}
