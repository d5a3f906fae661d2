use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::{
    api::upload::read_claim_form,
    error::AppError,
    models::ReceiptReadResult,
    services::ReceiptService,
    state::AppState,
    utils::request_id,
};

#[derive(Debug, Serialize)]
pub struct ReadReceiptResponse {
    /// Digits only, e.g. `"1234"`
    pub amount: String,
}

/// Reads the total amount from an uploaded receipt
/// POST /api/read-receipt
pub async fn read_receipt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ReadReceiptResponse>, AppError> {
    let request_id = request_id(&headers);
    info!(request_id = %request_id, "🧾 Read receipt request");

    let form = read_claim_form(&mut multipart).await?;
    if let Some(reason) = form.receipt_error {
        return Err(AppError::InvalidImage(reason));
    }
    let receipt = form
        .receipt
        .filter(|r| !r.is_empty())
        .ok_or(AppError::NoImage)?;

    match ReceiptService::read_amount(state.model.as_ref(), &receipt).await? {
        ReceiptReadResult::Amount(amount) => {
            info!(request_id = %request_id, amount, "✅ Receipt amount returned");
            Ok(Json(ReadReceiptResponse {
                amount: amount.to_string(),
            }))
        }
        ReceiptReadResult::Unreadable { reason } => Err(AppError::UnreadableReceipt { reason }),
    }
}
