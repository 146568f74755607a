//! Prometheus metrics, exposed in text format on `GET /metrics`.

use std::sync::LazyLock;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static HTTP_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "hookrelay_http_request_duration_seconds",
            "HTTP request latency",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "path", "status"],
    )
    .expect("static histogram options are valid");
    register(Box::new(histogram.clone()));
    histogram
});

pub static HTTP_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    counter_vec(
        "hookrelay_http_requests_total",
        "HTTP requests served",
        &["method", "path", "status"],
    )
});

/// One increment per webhook request, labelled by route and verdict
pub static WEBHOOK_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    counter_vec(
        "hookrelay_webhook_requests_total",
        "Webhook deliveries by route and outcome",
        &["route", "outcome"],
    )
});

pub static EVENTS_RECORDED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("hookrelay_events_recorded_total", "Event rows written")
        .expect("static counter options are valid");
    register(Box::new(counter.clone()));
    counter
});

pub static TASKS_SYNCED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("hookrelay_tasks_synced_total", "Tasks mirrored locally")
        .expect("static counter options are valid");
    register(Box::new(counter.clone()));
    counter
});

pub static JOBS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    counter_vec(
        "hookrelay_jobs_total",
        "Background jobs finished",
        &["outcome"],
    )
});

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    let counter =
        IntCounterVec::new(Opts::new(name, help), labels).expect("static counter options are valid");
    register(Box::new(counter.clone()));
    counter
}

fn register(collector: Box<dyn prometheus::core::Collector>) {
    if let Err(e) = REGISTRY.register(collector) {
        tracing::warn!(error = %e, "metric registration failed");
    }
}

/// Render every registered metric in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    // touch the lazies so an idle server still lists them
    LazyLock::force(&HTTP_REQUEST_DURATION);
    LazyLock::force(&HTTP_REQUESTS_TOTAL);
    LazyLock::force(&WEBHOOK_REQUESTS);
    LazyLock::force(&EVENTS_RECORDED);
    LazyLock::force(&TASKS_SYNCED);
    LazyLock::force(&JOBS_TOTAL);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
