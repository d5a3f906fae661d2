use std::sync::Arc;

use crate::config::Config;
use crate::error::ModelError;
use crate::services::{GeminiClient, GenerativeModel};

/// Shared application state.
/// Built once at startup; handlers only read it.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub model: Arc<dyn GenerativeModel>,
}

impl AppState {
    /// Production state backed by the Gemini client.
    pub fn new(config: Config) -> Result<Self, ModelError> {
        let model = GeminiClient::new(&config.gemini)?;
        tracing::info!(model = %config.gemini.model, "🤖 Gemini client initialized");
        Ok(Self::with_model(config, Arc::new(model)))
    }

    pub fn with_model(config: Config, model: Arc<dyn GenerativeModel>) -> Self {
        Self { config, model }
    }
}
