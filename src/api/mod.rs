pub mod analyze;
pub mod check_expense;
pub mod read_receipt;
pub mod upload;

use axum::{routing::post, Router};
use std::sync::Arc;

use crate::state::AppState;

pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/read-receipt", post(read_receipt::read_receipt))
        .route("/analyze", post(analyze::analyze))
        .route("/api/check-expense", post(check_expense::check_expense))
}
