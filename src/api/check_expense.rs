use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, HeaderName},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    error::{AppError, CheckError, INVALID_REQUEST_MESSAGE},
    models::CheckExpenseRequest,
    services::ExpenseCheckService,
    state::AppState,
    utils::request_id,
};

pub const IMPLICATED_FIELDS_HEADER: &str = "x-implicated-fields";

/// Lightweight JSON-mode check of the text fields
/// POST /api/check-expense
///
/// The body is exactly the JSON object the model sent. Fields guessed from
/// the message go into `x-implicated-fields`. Unparseable request bodies get
/// the same `{status: "error", message}` shape as model failures.
pub async fn check_expense(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<CheckExpenseRequest>, JsonRejection>,
) -> Result<Response, CheckError> {
    let request_id = request_id(&headers);
    info!(request_id = %request_id, "🔎 Check expense request");

    let Json(payload) = payload.map_err(|rejection| {
        warn!(request_id = %request_id, "Rejected check body: {}", rejection.body_text());
        CheckError(AppError::BadRequest(INVALID_REQUEST_MESSAGE.to_string()))
    })?;

    let outcome = ExpenseCheckService::check(state.model.as_ref(), &payload)
        .await
        .map_err(CheckError)?;

    let implicated = outcome
        .result
        .implicated_fields()
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(",");
    info!(request_id = %request_id, status = ?outcome.result.status, implicated = %implicated, "✅ Check completed");

    Ok((
        [(HeaderName::from_static(IMPLICATED_FIELDS_HEADER), implicated)],
        Json(outcome.payload),
    )
        .into_response())
}
