use std::time::Instant;

use tracing::{info, warn};

use crate::error::ModelError;
use crate::models::{parse_amount, ModelText, ReceiptImage, ReceiptReadResult};
use crate::observability::record_ai_call;
use crate::services::model::{ContentPart, GenerativeModel};

/// Token the model is told to answer with when it cannot find a total.
pub const UNREADABLE_SENTINEL: &str = "error";

const READ_AMOUNT_PROMPT: &str = "この領収書の画像に記載された合計金額を読み取ってください。\
回答は半角数字のみとし、通貨記号・カンマ・単位・説明文は一切含めないでください。\
合計金額が読み取れない場合は error とだけ回答してください。";

/// Reads the total amount off a receipt photo
pub struct ReceiptService;

impl ReceiptService {
    /// One model call, no retry. Provider failures are returned as-is for the
    /// caller to classify; an unusable reply is a `ReceiptReadResult::Unreadable`.
    pub async fn read_amount(
        model: &dyn GenerativeModel,
        receipt: &ReceiptImage,
    ) -> Result<ReceiptReadResult, ModelError> {
        info!(
            model = model.name(),
            mime_type = %receipt.mime_type,
            image_bytes = receipt.len(),
            "🧾 Reading receipt amount"
        );
        let start = Instant::now();

        let reply = model
            .generate(vec![
                ContentPart::text(READ_AMOUNT_PROMPT),
                ContentPart::image(receipt),
            ])
            .await;

        let elapsed = start.elapsed().as_secs_f64();
        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                record_ai_call("read_receipt", e.outcome(), elapsed);
                return Err(e);
            }
        };

        let result = Self::interpret(&reply);
        match &result {
            ReceiptReadResult::Amount(amount) => {
                record_ai_call("read_receipt", "ok", elapsed);
                info!(amount, "✅ Receipt amount read");
            }
            ReceiptReadResult::Unreadable { reason } => {
                record_ai_call("read_receipt", "unreadable", elapsed);
                warn!(reply = %reply.trimmed(), "⚠️ Receipt unreadable: {}", reason);
            }
        }
        Ok(result)
    }

    /// Maps the model reply to an amount. The sentinel, an empty reply and
    /// anything that is not a whole number are all unreadable.
    pub fn interpret(reply: &ModelText) -> ReceiptReadResult {
        let text = reply
            .trimmed()
            .trim_matches(|c| c == '\'' || c == '"' || c == '`')
            .trim();

        if text.is_empty() {
            return ReceiptReadResult::Unreadable {
                reason: "empty reply".to_string(),
            };
        }
        if text.eq_ignore_ascii_case(UNREADABLE_SENTINEL) {
            return ReceiptReadResult::Unreadable {
                reason: "model returned the sentinel".to_string(),
            };
        }

        match parse_amount(text) {
            Some(amount) => ReceiptReadResult::Amount(amount),
            None => ReceiptReadResult::Unreadable {
                reason: format!("not a whole number: {:?}", text),
            },
        }
    }
}
