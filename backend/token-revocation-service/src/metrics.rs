//! Prometheus metrics for the revocation pipeline

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};
use std::time::Duration;

static TOKENS_REVOKED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new("tokens_revoked_total", "Number of tokens revoked"),
        &["reason"],
    )
    .expect("failed to create tokens_revoked_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register tokens_revoked_total");
    counter
});

static ALERTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "revocation_alerts_total",
            "Alerts consumed by the token revoker, by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create revocation_alerts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register revocation_alerts_total");
    counter
});

static PROCESSING_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "revocation_processing_duration_seconds",
            "Time spent applying one alert against the ledger and blacklist",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["outcome"],
    )
    .expect("failed to create revocation_processing_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register revocation_processing_duration_seconds");
    histogram
});

/// Count tokens whose revocation has been committed
pub fn record_tokens_revoked(reason: &str, count: usize) {
    if count > 0 {
        TOKENS_REVOKED_TOTAL
            .with_label_values(&[reason])
            .inc_by(count as u64);
    }
}

pub fn tokens_revoked(reason: &str) -> u64 {
    TOKENS_REVOKED_TOTAL.with_label_values(&[reason]).get()
}

pub fn record_alert(outcome: &str) {
    ALERTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_processing(outcome: &str, elapsed: Duration) {
    PROCESSING_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64());
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
