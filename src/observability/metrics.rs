//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dampener_connections_accepted_total` (counter)
//! - `dampener_accept_errors_total` (counter)
//! - `dampener_spawn_failures_total` (counter)
//! - `dampener_processes_reaped_total` (counter)
//! - `dampener_admission_paused_total` (counter): by reason
//! - `dampener_live_processes` (gauge): current process table size
//!
//! # Design Decisions
//! - Updates go through the `metrics` facade and cost nothing until a
//!   recorder is installed
//! - The Prometheus endpoint is opt-in (`--metrics-address`)

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_accepted() {
    counter!("dampener_connections_accepted_total").increment(1);
}

pub fn record_accept_error() {
    counter!("dampener_accept_errors_total").increment(1);
}

pub fn record_spawn_failure() {
    counter!("dampener_spawn_failures_total").increment(1);
}

pub fn record_reaped() {
    counter!("dampener_processes_reaped_total").increment(1);
}

pub fn record_paused(reason: &'static str) {
    counter!("dampener_admission_paused_total", "reason" => reason).increment(1);
}

pub fn set_live_processes(live: usize) {
    gauge!("dampener_live_processes").set(live as f64);
}
