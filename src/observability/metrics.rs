//! Metrics collection for `signalrig`.
//!
//! Prometheus-compatible metrics through the `metrics` facade. Recording
//! functions are no-ops until [`init_metrics`] installs a recorder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::SignalRigError;
use crate::signal::lane::Lane;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Maximum length for phase name labels.
///
/// Phase names may come from a configured catalog.
const MAX_PHASE_LABEL_LEN: usize = 64;

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without an
/// HTTP endpoint.
///
/// # Errors
///
/// Returns `SignalRigError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), SignalRigError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| SignalRigError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "signalrig_cycles_total",
        "Executed cycles by phase and outcome"
    );
    describe_histogram!(
        "signalrig_cycle_duration_ms",
        "Wall time of executed cycles in milliseconds"
    );
    describe_counter!(
        "signalrig_hardware_failures_total",
        "Lane commands skipped after the retry also failed"
    );
    describe_counter!(
        "signalrig_fairness_overrides_total",
        "Selections forced to the other group by the streak bound"
    );
    describe_counter!(
        "signalrig_rejected_operations_total",
        "Operations rejected because another sequence held the rig"
    );
    describe_gauge!("signalrig_vehicles_waiting", "Latest total vehicle count");
    describe_gauge!("signalrig_controller_running", "1 while the control loop runs");
}

/// Sanitizes a phase name for use as a metrics label.
fn sanitize_phase_label(name: &str) -> String {
    name.chars()
        .take(MAX_PHASE_LABEL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Records a finished cycle.
pub fn record_cycle(phase: &str, outcome: &'static str, elapsed: Duration) {
    counter!(
        "signalrig_cycles_total",
        "phase" => sanitize_phase_label(phase),
        "outcome" => outcome,
    )
    .increment(1);
    histogram!("signalrig_cycle_duration_ms").record(elapsed.as_secs_f64() * 1000.0);
}

/// Records a lane command skipped after its retry.
pub fn record_hardware_failure(lane: Lane) {
    counter!(
        "signalrig_hardware_failures_total",
        "lane" => lane.label().to_string()
    )
    .increment(1);
}

/// Records a fairness override.
pub fn record_fairness_override() {
    counter!("signalrig_fairness_overrides_total").increment(1);
}

/// Records an operation rejected by the exclusivity flag.
pub fn record_rejected(operation: &'static str) {
    counter!("signalrig_rejected_operations_total", "operation" => operation).increment(1);
}

/// Sets the waiting-vehicles gauge.
pub fn set_vehicles_waiting(total: u32) {
    gauge!("signalrig_vehicles_waiting").set(f64::from(total));
}

/// Sets the loop running gauge.
pub fn set_running(running: bool) {
    gauge!("signalrig_controller_running").set(if running { 1.0 } else { 0.0 });
}
