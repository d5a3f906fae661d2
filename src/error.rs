//! Error handling for the model client and the HTTP boundary

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::models::{CheckResult, ClaimField, ModelTextError};

pub const MISSING_INPUT_MESSAGE: &str = "入力が不足しています。赤色の項目を確認してください。";
pub const NO_IMAGE_MESSAGE: &str = "画像ファイルがありません。";
pub const INVALID_IMAGE_MESSAGE: &str = "画像ファイルの形式が正しくありません。";
pub const UNREADABLE_RECEIPT_MESSAGE: &str = "金額を読み取れませんでした。";
pub const GENERIC_AI_FAILURE_MESSAGE: &str = "AIとの通信中にサーバー側でエラーが発生しました。";
pub const ANALYZE_FAILURE_MESSAGE: &str = "AIの解析中にサーバー側でエラーが発生しました。";
pub const MALFORMED_AI_JSON_MESSAGE: &str = "AIの応答を解釈できませんでした。";
pub const INVALID_REQUEST_MESSAGE: &str = "リクエストの形式が正しくありません。入力内容を確認してください。";

const RATE_LIMIT_PREFIX: &str = "APIの利用が一時的に制限されています。";
const DAILY_QUOTA_SUFFIX: &str =
    " 本日の利用上限に達したため、現在ご利用いただけません。明日以降に再度お試しください。";
const PER_MINUTE_SUFFIX: &str = " 1分ほど時間をおいてから、再度お試しください。";

/// Failure talking to the generative model provider.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    #[error("Model response could not be decoded: {0}")]
    Decode(String),

    #[error("Model blocked the request: {reason}")]
    Blocked { reason: String },
}

/// How a provider failure is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFailureKind {
    DailyQuota,
    RateLimited,
    Upstream,
}

impl ModelError {
    pub fn api(status: u16, message: impl Into<String>, details: Option<Value>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            details,
        }
    }

    /// Rate limits are split by looking for `PerDay` in the provider's error detail.
    pub fn kind(&self) -> ModelFailureKind {
        match self {
            ModelError::Api {
                status: 429,
                message,
                details,
            } => {
                let detail_text = details
                    .as_ref()
                    .map(|d| d.to_string())
                    .unwrap_or_default();
                if detail_text.contains("PerDay") || message.contains("PerDay") {
                    ModelFailureKind::DailyQuota
                } else {
                    ModelFailureKind::RateLimited
                }
            }
            ModelError::Http(e) if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) => {
                ModelFailureKind::RateLimited
            }
            _ => ModelFailureKind::Upstream,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ModelFailureKind::DailyQuota | ModelFailureKind::RateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ModelFailureKind::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing message; `generic` is used for anything that is not a rate limit.
    pub fn user_message(&self, generic: &str) -> String {
        match self.kind() {
            ModelFailureKind::DailyQuota => format!("{}{}", RATE_LIMIT_PREFIX, DAILY_QUOTA_SUFFIX),
            ModelFailureKind::RateLimited => format!("{}{}", RATE_LIMIT_PREFIX, PER_MINUTE_SUFFIX),
            ModelFailureKind::Upstream => generic.to_string(),
        }
    }

    /// Metric label for the outcome.
    pub fn outcome(&self) -> &'static str {
        match self.kind() {
            ModelFailureKind::DailyQuota => "daily_quota",
            ModelFailureKind::RateLimited => "rate_limited",
            ModelFailureKind::Upstream => "failed",
        }
    }
}

/// Errors surfaced at the request boundary.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Missing input: {0:?}")]
    MissingInput(Vec<ClaimField>),

    #[error("No receipt image in request")]
    NoImage,

    #[error("Invalid receipt image: {0}")]
    InvalidImage(String),

    #[error("Receipt unreadable: {reason}")]
    UnreadableReceipt { reason: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    MalformedModelJson(#[from] ModelTextError),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingInput(_)
            | AppError::NoImage
            | AppError::InvalidImage(_)
            | AppError::UnreadableReceipt { .. }
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Model(e) => e.status_code(),
            AppError::MalformedModelJson(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MissingInput(_) => "MISSING_INPUT",
            AppError::NoImage => "NO_IMAGE",
            AppError::InvalidImage(_) => "INVALID_IMAGE",
            AppError::UnreadableReceipt { .. } => "UNREADABLE_RECEIPT",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Model(e) => match e.kind() {
                ModelFailureKind::DailyQuota => "DAILY_QUOTA_EXCEEDED",
                ModelFailureKind::RateLimited => "RATE_LIMITED",
                ModelFailureKind::Upstream => "AI_SERVICE_ERROR",
            },
            AppError::MalformedModelJson(_) => "AI_RESPONSE_INVALID",
        }
    }

    /// Message shown to the user, with `generic` used for non rate-limit model failures.
    pub fn user_message_with(&self, generic: &str) -> String {
        match self {
            AppError::MissingInput(_) => MISSING_INPUT_MESSAGE.to_string(),
            AppError::NoImage => NO_IMAGE_MESSAGE.to_string(),
            AppError::InvalidImage(_) => INVALID_IMAGE_MESSAGE.to_string(),
            AppError::UnreadableReceipt { .. } => UNREADABLE_RECEIPT_MESSAGE.to_string(),
            AppError::BadRequest(message) => message.clone(),
            AppError::Model(e) => e.user_message(generic),
            AppError::MalformedModelJson(_) => MALFORMED_AI_JSON_MESSAGE.to_string(),
        }
    }

    pub fn user_message(&self) -> String {
        self.user_message_with(GENERIC_AI_FAILURE_MESSAGE)
    }

    fn log(&self) {
        if self.status_code().is_server_error() {
            tracing::error!(code = self.error_code(), "API Error: {}", self);
        } else {
            tracing::warn!(code = self.error_code(), "API Error: {}", self);
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// `{error}` shape, used by the receipt endpoint.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let body = ErrorBody {
            error: self.user_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeErrorBody {
    pub message: String,
    pub error_fields: Vec<ClaimField>,
}

/// `{message, errorFields}` shape, used by `/analyze` before streaming starts.
#[derive(Debug)]
pub struct AnalyzeError(pub AppError);

impl From<AppError> for AnalyzeError {
    fn from(e: AppError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AnalyzeError {
    fn into_response(self) -> Response {
        let AnalyzeError(error) = self;
        error.log();
        let error_fields = match &error {
            AppError::MissingInput(fields) => fields.clone(),
            AppError::NoImage | AppError::InvalidImage(_) => vec![ClaimField::ReceiptImage],
            _ => Vec::new(),
        };
        let body = AnalyzeErrorBody {
            message: error.user_message_with(ANALYZE_FAILURE_MESSAGE),
            error_fields,
        };
        (error.status_code(), Json(body)).into_response()
    }
}

/// `{status: "error", message}` shape, used by the JSON-mode check.
#[derive(Debug)]
pub struct CheckError(pub AppError);

impl From<AppError> for CheckError {
    fn from(e: AppError) -> Self {
        Self(e)
    }
}

impl IntoResponse for CheckError {
    fn into_response(self) -> Response {
        let CheckError(error) = self;
        error.log();
        let body = CheckResult::error(error.user_message());
        (error.status_code(), Json(body)).into_response()
    }
}
