mod common;

use std::sync::atomic::Ordering;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::StreamExt;
use serde_json::json;
use tower::ServiceExt; // for `oneshot`

use common::*;
use expense_ai_ws::{
    api::check_expense::IMPLICATED_FIELDS_HEADER,
    error::{
        ANALYZE_FAILURE_MESSAGE, GENERIC_AI_FAILURE_MESSAGE, INVALID_IMAGE_MESSAGE,
        INVALID_REQUEST_MESSAGE, MISSING_INPUT_MESSAGE, NO_IMAGE_MESSAGE,
        UNREADABLE_RECEIPT_MESSAGE,
    },
};

// ============================================================================
// /api/read-receipt
// ============================================================================

#[tokio::test]
async fn read_receipt_returns_digits() {
    let (app, calls) = setup_test_app(Reply::Text("1234".into()));

    let response = app
        .oneshot(MultipartBuilder::new().receipt().into_request("/api/read-receipt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "amount": "1234" }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn read_receipt_tolerates_whitespace_around_the_number() {
    let (app, _) = setup_test_app(Reply::Text("  5800\n".into()));

    let response = app
        .oneshot(MultipartBuilder::new().receipt().into_request("/api/read-receipt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["amount"], "5800");
}

#[tokio::test]
async fn read_receipt_unreadable_replies_are_rejected() {
    for reply in ["error", "", "abc", "12.5"] {
        let (app, calls) = setup_test_app(Reply::Text(reply.into()));

        let response = app
            .oneshot(MultipartBuilder::new().receipt().into_request("/api/read-receipt"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "reply {:?}", reply);
        assert_eq!(
            body_json(response).await,
            json!({ "error": UNREADABLE_RECEIPT_MESSAGE })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn read_receipt_without_image_skips_the_model() {
    let (app, calls) = setup_test_app(Reply::Text("1234".into()));

    let response = app
        .oneshot(
            MultipartBuilder::new()
                .text("applicant", "山田太郎")
                .into_request("/api/read-receipt"),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({ "error": NO_IMAGE_MESSAGE }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn read_receipt_rejects_non_image_upload() {
    let (app, calls) = setup_test_app(Reply::Text("1234".into()));

    let response = app
        .oneshot(
            MultipartBuilder::new()
                .file("receiptImage", "notes.txt", "text/plain", b"hello")
                .into_request("/api/read-receipt"),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await, json!({ "error": INVALID_IMAGE_MESSAGE }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn read_receipt_daily_quota_maps_to_429() {
    let (app, _) = setup_test_app(Reply::Fail(daily_quota_error));

    let response = app
        .oneshot(MultipartBuilder::new().receipt().into_request("/api/read-receipt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("本日の利用上限"), "{}", message);
}

#[tokio::test]
async fn read_receipt_per_minute_limit_asks_to_wait() {
    let (app, _) = setup_test_app(Reply::Fail(per_minute_error));

    let response = app
        .oneshot(MultipartBuilder::new().receipt().into_request("/api/read-receipt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("1分ほど"), "{}", message);
    assert!(!message.contains("本日の利用上限"));
}

#[tokio::test]
async fn read_receipt_upstream_failure_is_generic_500() {
    let (app, _) = setup_test_app(Reply::Fail(upstream_error));

    let response = app
        .oneshot(MultipartBuilder::new().receipt().into_request("/api/read-receipt"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({ "error": GENERIC_AI_FAILURE_MESSAGE })
    );
}

// ============================================================================
// /analyze
// ============================================================================

fn claim_form(missing: &[&str]) -> MultipartBuilder {
    let mut form = MultipartBuilder::new();
    if !missing.contains(&"applicant") {
        form = form.text("applicant", "山田太郎");
    }
    if !missing.contains(&"title") {
        form = form.text("title", "出張交通費");
    }
    if !missing.contains(&"amount") {
        form = form.text("amount", "1,500");
    }
    if !missing.contains(&"receiptImage") {
        form = form.receipt();
    }
    form
}

#[tokio::test]
async fn analyze_reports_every_missing_combination_without_calling_the_model() {
    const ORDER: [&str; 4] = ["applicant", "title", "amount", "receiptImage"];

    for mask in 1u8..16 {
        let missing: Vec<&str> = ORDER
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, name)| *name)
            .collect();

        let (app, calls) = setup_test_app(Reply::Text("unused".into()));
        let response = app
            .oneshot(claim_form(&missing).into_request("/analyze"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "missing {:?}", missing);
        assert_eq!(
            body_json(response).await,
            json!({ "message": MISSING_INPUT_MESSAGE, "errorFields": missing }),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0, "missing {:?}", missing);
    }
}

#[tokio::test]
async fn analyze_treats_blank_text_and_empty_file_as_missing() {
    let (app, calls) = setup_test_app(Reply::Text("unused".into()));

    let request = MultipartBuilder::new()
        .text("applicant", "   ")
        .text("title", "出張交通費")
        .text("amount", "")
        .file("receiptImage", "", "application/octet-stream", b"")
        .into_request("/analyze");
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["errorFields"],
        json!(["applicant", "amount", "receiptImage"])
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn analyze_flags_non_numeric_amount() {
    let (app, calls) = setup_test_app(Reply::Text("unused".into()));

    let request = MultipartBuilder::new()
        .text("applicant", "山田太郎")
        .text("title", "出張交通費")
        .text("amount", "千五百円")
        .receipt()
        .into_request("/analyze");
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["errorFields"], json!(["amount"]));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn analyze_reports_refused_upload_with_missing_fields() {
    let (app, calls) = setup_test_app(Reply::Text("unused".into()));

    let request = MultipartBuilder::new()
        .text("title", "出張交通費")
        .text("amount", "1500")
        .file("receiptImage", "notes.txt", "text/plain", b"hello")
        .into_request("/analyze");
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "message": MISSING_INPUT_MESSAGE, "errorFields": ["applicant", "receiptImage"] })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn analyze_refused_upload_alone_gets_the_image_message() {
    let (app, calls) = setup_test_app(Reply::Text("unused".into()));

    let request = claim_form(&["receiptImage"])
        .file("receiptImage", "scan.pdf", "application/pdf", b"%PDF-1.7")
        .into_request("/analyze");
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        json!({ "message": INVALID_IMAGE_MESSAGE, "errorFields": ["receiptImage"] })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn analyze_streams_the_review_in_order() {
    let chunks = vec![
        "**確認結果**\n".to_string(),
        "申請者・タイトル・金額は領収書と一致しています。".to_string(),
        "\n問題ありません。".to_string(),
    ];
    let (app, calls) = setup_test_app(Reply::Chunks(chunks.clone()));

    let response = app
        .oneshot(claim_form(&[]).into_request("/analyze"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"), "{}", content_type);

    let mut received = Vec::new();
    let mut frames = 0;
    let mut body = response.into_body().into_data_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.unwrap();
        if !chunk.is_empty() {
            frames += 1;
        }
        received.extend_from_slice(&chunk);
    }

    assert_eq!(String::from_utf8(received).unwrap(), chunks.concat());
    // One frame per model chunk: the body is relayed, not collected first
    assert_eq!(frames, chunks.len());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn analyze_failure_before_first_chunk_is_json() {
    let (app, _) = setup_test_app(Reply::Fail(upstream_error));

    let response = app
        .oneshot(claim_form(&[]).into_request("/analyze"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        json!({ "message": ANALYZE_FAILURE_MESSAGE, "errorFields": [] })
    );
}

#[tokio::test]
async fn analyze_rate_limit_before_first_chunk_is_429() {
    let (app, _) = setup_test_app(Reply::Fail(daily_quota_error));

    let response = app
        .oneshot(claim_form(&[]).into_request("/analyze"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("本日の利用上限"));
}

#[tokio::test]
async fn analyze_mid_stream_failure_truncates_the_body() {
    let (app, _) = setup_test_app(Reply::ChunksThenFail(
        vec!["途中まで".to_string(), "の回答".to_string()],
        upstream_error,
    ));

    let response = app
        .oneshot(claim_form(&[]).into_request("/analyze"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(std::str::from_utf8(&bytes).unwrap(), "途中までの回答");
}

// ============================================================================
// /api/check-expense
// ============================================================================

fn check_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/check-expense")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn check_expense_returns_the_fenced_payload_exactly() {
    let payload = json!({ "status": "error", "message": "金額が0円です。金額を確認してください。" });
    let reply = format!("```json\n{}\n```", payload);
    let (app, calls) = setup_test_app(Reply::Text(reply));

    let response = app
        .oneshot(check_request(json!({
            "applicant": "山田太郎",
            "title": "備品購入",
            "amount": 0
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[IMPLICATED_FIELDS_HEADER], "amount");
    assert_eq!(body_json(response).await, payload);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn check_expense_keeps_keys_beyond_status_and_message() {
    let payload = json!({
        "status": "error",
        "message": "金額が不正です。",
        "errorFields": ["amount"]
    });
    let reply = format!("```json\n{}\n```", payload);
    let (app, _) = setup_test_app(Reply::Text(reply));

    let response = app
        .oneshot(check_request(json!({ "applicant": "a", "title": "b", "amount": "abc" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, payload);
}

#[tokio::test]
async fn check_expense_unparseable_bodies_use_error_shape() {
    let negative = check_request(json!({ "applicant": "a", "title": "b", "amount": -5 }));
    let malformed = Request::builder()
        .method("POST")
        .uri("/api/check-expense")
        .header("content-type", "application/json")
        .body(Body::from("{\"applicant\":"))
        .unwrap();
    let no_content_type = Request::builder()
        .method("POST")
        .uri("/api/check-expense")
        .body(Body::from(r#"{"applicant":"a","title":"b","amount":1}"#))
        .unwrap();

    for request in [negative, malformed, no_content_type] {
        let (app, calls) = setup_test_app(Reply::Text("unused".into()));

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({ "status": "error", "message": INVALID_REQUEST_MESSAGE })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn check_expense_success_implicates_nothing() {
    let payload = json!({ "status": "success", "message": "申請者・タイトル・金額に問題はありません。" });
    let (app, _) = setup_test_app(Reply::Text(payload.to_string()));

    let response = app
        .oneshot(check_request(json!({
            "applicant": "山田太郎",
            "title": "備品購入",
            "amount": "3,300"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[IMPLICATED_FIELDS_HEADER], "");
    assert_eq!(body_json(response).await, payload);
}

#[tokio::test]
async fn check_expense_malformed_reply_is_an_error_result() {
    let (app, _) = setup_test_app(Reply::Text("looks fine to me".into()));

    let response = app
        .oneshot(check_request(json!({ "applicant": "a", "title": "b", "amount": 1 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["status"], "error");
}

#[tokio::test]
async fn check_expense_rate_limit_uses_error_shape() {
    let (app, _) = setup_test_app(Reply::Fail(per_minute_error));

    let response = app
        .oneshot(check_request(json!({ "applicant": "a", "title": "b", "amount": 1 })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("1分ほど"));
}

// ============================================================================
// Operational endpoints and static client
// ============================================================================

#[tokio::test]
async fn health_check_reports_ok() {
    let (app, _) = setup_test_app(Reply::Text(String::new()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn metrics_are_exposed_in_text_format() {
    let (app, _) = setup_test_app(Reply::Text("1234".into()));

    // Record at least one AI call first
    let _ = app
        .clone()
        .oneshot(MultipartBuilder::new().receipt().into_request("/api/read-receipt"))
        .await
        .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("ai_calls_total"), "{}", text);
}

#[tokio::test]
async fn form_client_is_served_from_root() {
    let (app, _) = setup_test_app(Reply::Text(String::new()));

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-content-type-options"));
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert_eq!(content_type.parse::<mime::Mime>().unwrap().subtype(), mime::HTML);
}

#[tokio::test]
async fn form_client_script_uses_the_json_check() {
    let (app, _) = setup_test_app(Reply::Text(String::new()));

    let response = app
        .oneshot(Request::builder().uri("/script.js").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let script = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(script.contains("/api/check-expense"));
    assert!(script.contains(IMPLICATED_FIELDS_HEADER));
}
