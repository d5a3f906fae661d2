// ============================================================================
// PROMETHEUS METRICS
// ============================================================================

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec,
};

lazy_static! {
    // ========================================================================
    // HTTP REQUEST METRICS
    // ========================================================================

    /// Total HTTP requests by method, endpoint and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "endpoint", "status"]
    )
    .expect("register http_requests_total");

    /// Time until the response head is produced. For `/analyze` this excludes the streamed body.
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "endpoint"],
        vec![0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("register http_request_duration_seconds");

    // ========================================================================
    // MODEL METRICS
    // ========================================================================

    /// Model calls by operation (`read_receipt`, `review`, `check`) and outcome
    pub static ref AI_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_calls_total",
        "Total number of generative model calls",
        &["operation", "outcome"]
    )
    .expect("register ai_calls_total");

    pub static ref AI_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "ai_call_duration_seconds",
        "Generative model call duration in seconds (first chunk for streams)",
        &["operation"],
        vec![0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 60.0]
    )
    .expect("register ai_call_duration_seconds");

    /// Bytes relayed to clients from streamed reviews
    pub static ref AI_STREAMED_BYTES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ai_streamed_bytes_total",
        "Bytes relayed from model streams to clients",
        &["operation"]
    )
    .expect("register ai_streamed_bytes_total");
}

pub fn record_http_request(method: &str, endpoint: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, endpoint, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, endpoint])
        .observe(duration_secs);
}

pub fn record_ai_call(operation: &str, outcome: &str, duration_secs: f64) {
    AI_CALLS_TOTAL.with_label_values(&[operation, outcome]).inc();
    AI_CALL_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration_secs);
}

pub fn record_streamed_bytes(operation: &str, bytes: usize) {
    AI_STREAMED_BYTES_TOTAL
        .with_label_values(&[operation])
        .inc_by(bytes as u64);
}
