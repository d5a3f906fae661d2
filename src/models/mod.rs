pub mod expense;
pub mod model_text;

pub use expense::{
    parse_amount, AmountInput, CheckExpenseRequest, CheckResult, CheckStatus, ClaimField, ClaimForm, ExpenseClaim, ReceiptImage,
    ReceiptReadResult,
};
pub use model_text::{strip_code_fences, ModelText, ModelTextError};
