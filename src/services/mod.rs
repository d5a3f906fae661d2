pub mod check_service;
pub mod gemini_client;
pub mod model;
pub mod receipt_service;
pub mod review_service;
pub mod sse;

pub use check_service::{CheckOutcome, ExpenseCheckService};
pub use gemini_client::GeminiClient;
pub use model::{ContentPart, GenerativeModel, TextStream};
pub use receipt_service::ReceiptService;
