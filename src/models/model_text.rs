use serde::de::DeserializeOwned;

/// Raw text returned by the model, before any interpretation.
///
/// Replies are sometimes bare JSON, sometimes JSON wrapped in a markdown code
/// fence, sometimes prose. Interpretation is an explicit step so callers get a
/// typed failure instead of a parser error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelText {
    raw: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelTextError {
    #[error("model returned an empty reply")]
    Empty,

    #[error("model reply is not the expected JSON: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
        payload: String,
    },
}

impl ModelText {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn trimmed(&self) -> &str {
        self.raw.trim()
    }

    /// The reply with any surrounding ```` ``` ```` / ```` ```json ```` fence removed.
    pub fn unfenced(&self) -> &str {
        strip_code_fences(&self.raw)
    }

    /// Strips fencing and deserializes the payload.
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, ModelTextError> {
        let payload = self.unfenced();
        if payload.is_empty() {
            return Err(ModelTextError::Empty);
        }
        serde_json::from_str(payload).map_err(|source| ModelTextError::Malformed {
            source,
            payload: payload.to_string(),
        })
    }
}

/// Returns the contents of the first markdown code fence, or the trimmed text
/// when there is none. An unterminated fence yields everything after the opener.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(open) = text.find("```") else {
        return text;
    };

    let after_open = &text[open + 3..];
    // Language tag, e.g. `json`
    let tag_len = after_open
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after_open.len());
    let body = &after_open[tag_len..];

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}
