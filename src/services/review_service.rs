//! Streamed review of a complete expense claim.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use futures::{future, stream, Stream, StreamExt};
use tracing::{info, warn};

use crate::error::ModelError;
use crate::models::ExpenseClaim;
use crate::observability::{record_ai_call, record_streamed_bytes};
use crate::services::model::{ContentPart, GenerativeModel, TextStream};

const OPERATION: &str = "review";

/// Reviewer instructions with the claim filled in.
pub fn build_review_prompt(claim: &ExpenseClaim) -> String {
    format!(
        r#"あなたは経費精算を担当するベテランの経理担当者です。
次の経費申請と添付された領収書画像を照合し、厳密にチェックしてください。
回答はマークダウン形式で記述してください。回答は生成された順に少しずつ画面へ表示されます。

## 申請内容
- 申請者: {applicant}
- 申請タイトル: {title}
- 申請金額: {amount} 円

## チェック項目
1. **金額の整合性**: 領収書の合計金額と申請金額が一致しているかを確認してください。
2. **内容の妥当性**: 領収書の店名や品目が申請タイトルと合っているか、経費として妥当かを判断してください。
3. **記載事項の抽出**: 領収書から「合計金額」「発行日」「店名」を読み取って示してください。

## 出力
- 金額の不一致や内容の疑問点があれば、該当箇所を具体的に指摘してください。
- 問題が見つからなければ「申請内容と領収書に問題は見つかりませんでした。」のような肯定的なメッセージを返してください。
"#,
        applicant = claim.applicant,
        title = claim.title,
        amount = format_yen(claim.amount_minor_units),
    )
}

/// `1234567` -> `1,234,567`
fn format_yen(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Opens the review stream and waits for its first item.
///
/// Failing before any text exists lets the caller still choose the status
/// code. The returned stream replays the first chunk followed by the rest.
pub async fn open_review(
    model: &dyn GenerativeModel,
    claim: &ExpenseClaim,
) -> Result<TextStream, ModelError> {
    info!(
        model = model.name(),
        applicant = %claim.applicant,
        amount = claim.amount_minor_units,
        "📝 Starting streamed review"
    );
    let start = Instant::now();

    let parts = vec![
        ContentPart::text(build_review_prompt(claim)),
        ContentPart::image(&claim.receipt),
    ];

    let mut upstream = match model.generate_stream(parts).await {
        Ok(s) => s,
        Err(e) => {
            record_ai_call(OPERATION, e.outcome(), start.elapsed().as_secs_f64());
            return Err(e);
        }
    };

    match upstream.next().await {
        Some(Ok(first)) => {
            record_ai_call(OPERATION, "ok", start.elapsed().as_secs_f64());
            Ok(stream::once(future::ready(Ok(first))).chain(upstream).boxed())
        }
        Some(Err(e)) => {
            record_ai_call(OPERATION, e.outcome(), start.elapsed().as_secs_f64());
            Err(e)
        }
        None => {
            record_ai_call(OPERATION, "ok", start.elapsed().as_secs_f64());
            warn!("⚠️ Model stream ended without any text");
            Ok(stream::empty().boxed())
        }
    }
}

/// Adapts the model stream into response body chunks.
///
/// Chunks pass through in order and unbuffered. The first error is logged and
/// ends the body, since the status line has already gone out.
pub fn relay(
    upstream: TextStream,
    request_id: String,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let relayed = Arc::new(AtomicUsize::new(0));
    let counter = relayed.clone();
    let failure_id = request_id.clone();

    upstream
        .inspect(move |item| {
            if let Err(e) = item {
                warn!(request_id = %failure_id, "⚠️ Review stream interrupted: {}", e);
            }
        })
        .take_while(|item| future::ready(item.is_ok()))
        .filter_map(|item| future::ready(item.ok()))
        .map(move |text| {
            counter.fetch_add(text.len(), Ordering::Relaxed);
            Some(Ok(Bytes::from(text)))
        })
        .chain(stream::once(async move {
            let total = relayed.load(Ordering::Relaxed);
            record_streamed_bytes(OPERATION, total);
            info!(request_id = %request_id, bytes = total, "✅ Review relay finished");
            None
        }))
        .filter_map(|item: Option<Result<Bytes, Infallible>>| future::ready(item))
}
