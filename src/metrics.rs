// src/metrics.rs

#[cfg(feature = "observability")]
pub use ::metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

// Macros for metrics when observability is disabled
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[allow(unused_imports)]
use crate::{counter, describe_counter, describe_histogram, histogram};

/// Initializes the descriptions for all the metrics in the library.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "programs_encoded_total",
        Unit::Count,
        "Total number of programs encoded, labeled by strategy."
    );
    describe_histogram!(
        "program_size_bytes",
        Unit::Bytes,
        "Size of encoded programs in bytes, labeled by strategy."
    );
    describe_counter!(
        "dispatch_runs_total",
        Unit::Count,
        "Total number of dispatcher runs, labeled by strategy and outcome (done or the error kind)."
    );
    describe_counter!(
        "registry_changes_total",
        Unit::Count,
        "Total number of executor registry changes, labeled by action (registered, removed)."
    );
}

// --- Helper functions to update metrics ---

pub fn record_program_encoded(strategy: &'static str, size: usize) {
    counter!("programs_encoded_total", 1, "strategy" => strategy);
    histogram!("program_size_bytes", size as f64, "strategy" => strategy);
}

pub fn record_run(strategy: &'static str, outcome: &'static str) {
    counter!("dispatch_runs_total", 1, "strategy" => strategy, "outcome" => outcome);
}

pub fn record_registry_change(action: &'static str) {
    counter!("registry_changes_total", 1, "action" => action);
}

/// Installs the JSON tracing subscriber and the Prometheus recorder, then
/// describes every metric. Fails if a global subscriber or recorder is already set.
#[cfg(feature = "observability")]
pub fn init_observability() -> anyhow::Result<metrics_exporter_prometheus::PrometheusHandle> {
    tracing_subscriber::fmt()
        .json()
        .try_init()
        .map_err(|e| anyhow::anyhow!("tracing subscriber: {}", e))?;
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}
