use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

use crate::services::provider::ProviderError;

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Analysis Metrics
    pub static ref ANALYSIS_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "analysis_requests_total",
        "Total number of analysis requests",
        &["help_mode"]
    )
    .unwrap();

    pub static ref FINDINGS_REPORTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "findings_reported_total",
        "Total number of findings returned to learners",
        &["type"]
    )
    .unwrap();

    pub static ref HINTS_DEGRADED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "hints_degraded_total",
        "Hints replaced by a generic hint after failing disclosure checks",
        &["level"]
    )
    .unwrap();

    // Provider Metrics
    pub static ref PROVIDER_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "provider_calls_total",
        "Total number of feedback provider calls",
        &["outcome"]
    )
    .unwrap();

    pub static ref PROVIDER_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "provider_call_duration_seconds",
        "Feedback provider call duration in seconds",
        &["outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: time a provider call and record its outcome
pub async fn track_provider_call<F, T>(future: F) -> Result<T, ProviderError>
where
    F: std::future::Future<Output = Result<T, ProviderError>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let outcome = match &result {
        Ok(_) => "success",
        Err(e) => e.outcome(),
    };

    PROVIDER_CALLS_TOTAL.with_label_values(&[outcome]).inc();
    PROVIDER_CALL_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration);

    result
}

pub fn record_analysis(help_mode: &str) {
    ANALYSIS_REQUESTS_TOTAL.with_label_values(&[help_mode]).inc();
}

pub fn record_finding(kind: &str) {
    FINDINGS_REPORTED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_hint_degraded(level: &str) {
    HINTS_DEGRADED_TOTAL.with_label_values(&[level]).inc();
}
