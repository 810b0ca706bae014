use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};
use ranked_cache::CacheMetrics;
use tracing::warn;

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "listing_service_http_requests_total",
            "Total HTTP requests handled by listing-service",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create listing_service_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register listing_service_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "listing_service_http_request_duration_seconds",
            "HTTP request latency for listing-service",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "path", "status"],
    )
    .expect("failed to create listing_service_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register listing_service_http_request_duration_seconds");
    histogram
});

static LISTING_TASKS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "listing_tasks_total",
            "Listing propagation tasks processed, by outcome",
        ),
        &["kind", "result"],
    )
    .expect("failed to create listing_tasks_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register listing_tasks_total");
    counter
});

static LINK_CACHE_LOOKUPS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "link_cache_lookups_total",
            "Link entity lookups, by cache result",
        ),
        &["result"],
    )
    .expect("failed to create link_cache_lookups_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register link_cache_lookups_total");
    counter
});

/// Expose the ranked cache counters on the default registry.
pub fn init() {
    if let Err(e) = CacheMetrics::register(prometheus::default_registry()) {
        warn!(error = %e, "Ranked cache metrics already registered");
    }
}

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

/// `result` is one of `ok`, `retried`, `dropped`.
pub fn record_task(kind: &str, result: &str) {
    LISTING_TASKS_TOTAL.with_label_values(&[kind, result]).inc();
}

pub fn task_count(kind: &str, result: &str) -> u64 {
    LISTING_TASKS_TOTAL.with_label_values(&[kind, result]).get()
}

pub fn record_link_lookups(hits: usize, misses: usize) {
    LINK_CACHE_LOOKUPS_TOTAL
        .with_label_values(&["hit"])
        .inc_by(hits as u64);
    LINK_CACHE_LOOKUPS_TOTAL
        .with_label_values(&["miss"])
        .inc_by(misses as u64);
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
