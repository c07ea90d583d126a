//! Metrics collection and exposition.
//!
//! # Metrics
//! - `stop_requests_total` (counter): stop endpoint calls by outcome
//! - `registry_operations_total` (counter): registry calls by operation, outcome
//! - `service_status` (gauge): last status published to the registry
//!   (0=STARTING, 1=RUNNING, 2=STOPPING, 3=STOPPED, 4=FAILED)
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op (tests, embedding)
//! - The Prometheus text format is rendered by the admin listener

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::discovery::ServiceStatus;

/// Install the global Prometheus recorder.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Prometheus recorder installed");
    Ok(handle)
}

pub fn record_stop_request(outcome: &'static str) {
    metrics::counter!("stop_requests_total", "outcome" => outcome).increment(1);
}

pub fn record_registry_operation(operation: &'static str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    metrics::counter!(
        "registry_operations_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_service_status(status: ServiceStatus) {
    metrics::gauge!("service_status").set(status.code());
}
