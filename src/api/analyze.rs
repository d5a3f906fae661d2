use axum::{
    body::Body,
    extract::{Multipart, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    api::upload::read_claim_form,
    error::{AnalyzeError, AppError},
    models::ClaimField,
    services::review_service::{open_review, relay},
    state::AppState,
    utils::request_id,
};

/// Validates the whole form and streams the model's review back as plain text
/// POST /analyze
///
/// Missing fields are answered with 400 `{message, errorFields}` without
/// calling the model. Once the first chunk is out the status stays 200.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, AnalyzeError> {
    let request_id = request_id(&headers);
    info!(request_id = %request_id, "📨 Analyze request");

    let form = read_claim_form(&mut multipart).await?;
    let receipt_error = form.receipt_error.clone();
    let claim = form.into_claim().map_err(|fields| {
        warn!(request_id = %request_id, ?fields, "Claim is incomplete");
        match receipt_error {
            // Only the upload is wrong: say so instead of "missing input"
            Some(reason) if fields == [ClaimField::ReceiptImage] => AppError::InvalidImage(reason),
            _ => AppError::MissingInput(fields),
        }
    })?;

    let upstream = open_review(state.model.as_ref(), &claim)
        .await
        .map_err(AppError::from)?;

    let body = Body::from_stream(relay(upstream, request_id));
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response())
}
