use std::time::Instant;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{CheckExpenseRequest, CheckResult, ModelText, ModelTextError};
use crate::observability::record_ai_call;
use crate::services::model::{ContentPart, GenerativeModel};

const OPERATION: &str = "check";

/// Text-only consistency check answered as JSON
pub struct ExpenseCheckService;

/// The model's JSON object as sent, plus the fields the handler relies on.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub payload: Value,
    pub result: CheckResult,
}

impl ExpenseCheckService {
    pub fn build_prompt(request: &CheckExpenseRequest) -> String {
        format!(
            r#"あなたは経費精算の担当者です。次の経費申請の入力内容を確認してください。

- 申請者: {applicant}
- 申請タイトル: {title}
- 金額: {amount}

確認事項:
1. 申請者、申請タイトル、金額がすべて入力されているか。
2. 金額が正の整数として妥当か。
3. 申請タイトルが経費の内容として妥当か。

結果は次の JSON 形式だけで回答してください。説明文は不要です。
{{"status": "success" または "error", "message": "利用者に表示する日本語のメッセージ"}}
問題がある場合は status を "error" にし、message の中で問題のある項目名（申請者・タイトル・金額）を明記してください。"#,
            applicant = request.applicant.trim(),
            title = request.title.trim(),
            amount = request.amount,
        )
    }

    /// Asks the model for a verdict and unwraps its JSON reply.
    pub async fn check(
        model: &dyn GenerativeModel,
        request: &CheckExpenseRequest,
    ) -> Result<CheckOutcome, AppError> {
        info!(model = model.name(), "🔎 Running JSON-mode expense check");
        let start = Instant::now();

        let reply = model
            .generate(vec![ContentPart::text(Self::build_prompt(request))])
            .await;
        let elapsed = start.elapsed().as_secs_f64();

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                record_ai_call(OPERATION, e.outcome(), elapsed);
                return Err(e.into());
            }
        };

        match Self::interpret(&reply) {
            Ok(outcome) => {
                record_ai_call(OPERATION, "ok", elapsed);
                info!(status = ?outcome.result.status, "✅ Expense check parsed");
                Ok(outcome)
            }
            Err(e) => {
                record_ai_call(OPERATION, "bad_json", elapsed);
                warn!(reply = %reply.raw(), "⚠️ Expense check reply is not valid JSON");
                Err(e.into())
            }
        }
    }

    /// Unwraps the reply into the raw JSON object and its typed view.
    /// Extra keys stay in `payload`; `status` and `message` must be valid.
    pub fn interpret(reply: &ModelText) -> Result<CheckOutcome, ModelTextError> {
        let payload: Value = reply.parse_json()?;
        let result = serde_json::from_value::<CheckResult>(payload.clone()).map_err(|source| {
            ModelTextError::Malformed {
                source,
                payload: reply.unfenced().to_string(),
            }
        })?;
        Ok(CheckOutcome { payload, result })
    }
}
