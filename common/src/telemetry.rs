// Telemetry: structured logging and dispatch metrics

use anyhow::Result;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DISPATCH_SUCCESS_TOTAL: &str = "dispatch_success_total";
pub const DISPATCH_FAILED_TOTAL: &str = "dispatch_failed_total";
pub const DISPATCH_SKIPPED_TOTAL: &str = "dispatch_skipped_total";
pub const DISPATCH_DURATION_SECONDS: &str = "dispatch_duration_seconds";

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. With `json` set, log lines are
/// emitted as JSON objects carrying the current span; otherwise the compact
/// human format is used.
pub fn init_logging(log_level: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to create env filter: {}", e))?;

    let (json_layer, text_layer) = if json {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        (Some(layer), None)
    } else {
        (None, Some(fmt::layer().with_target(true)))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    tracing::info!(log_level = log_level, json = json, "Structured logging initialized");

    Ok(())
}

/// Install the Prometheus recorder and describe the dispatch metrics.
///
/// The returned handle renders the exposition text served at `/metrics`.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    describe_counter!(DISPATCH_SUCCESS_TOTAL, "Total number of files dispatched");
    describe_counter!(
        DISPATCH_FAILED_TOTAL,
        "Total number of dispatch runs that failed, by reason"
    );
    describe_counter!(
        DISPATCH_SKIPPED_TOTAL,
        "Total number of dispatch runs that found no file"
    );
    describe_histogram!(
        DISPATCH_DURATION_SECONDS,
        "Duration of dispatch runs in seconds"
    );

    tracing::info!("Prometheus metrics recorder installed");

    Ok(handle)
}

#[inline]
pub fn record_dispatch_success() {
    counter!(DISPATCH_SUCCESS_TOTAL).increment(1);
}

#[inline]
pub fn record_dispatch_failure(reason: &'static str) {
    counter!(DISPATCH_FAILED_TOTAL, "reason" => reason).increment(1);
}

#[inline]
pub fn record_dispatch_skipped() {
    counter!(DISPATCH_SKIPPED_TOTAL).increment(1);
}

#[inline]
pub fn record_dispatch_duration(duration_seconds: f64) {
    histogram!(DISPATCH_DURATION_SECONDS).record(duration_seconds);
}
