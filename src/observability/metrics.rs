//! Metrics collection and exposition.
//!
//! # Metrics
//! - `custody_operations_dispatched_total` (counter): dispatch attempts by type, outcome
//! - `custody_events_ingested_total` (counter): chain logs by outcome
//! - `custody_confirmations_total` (counter): tracker results by outcome
//! - `custody_cycle_duration_seconds` (histogram): one full service cycle
//! - `custody_network_alive` (gauge): 1=alive, 0=dead
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition is opt-in via configuration

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_dispatch(operation_type: &str, outcome: &'static str) {
    ::metrics::counter!(
        "custody_operations_dispatched_total",
        "type" => operation_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_event_ingested(outcome: &'static str) {
    ::metrics::counter!("custody_events_ingested_total", "outcome" => outcome).increment(1);
}

pub fn record_confirmation(outcome: &'static str) {
    ::metrics::counter!("custody_confirmations_total", "outcome" => outcome).increment(1);
}

pub fn record_cycle_duration(duration: Duration) {
    ::metrics::histogram!("custody_cycle_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_network_alive(network: &str, alive: bool) {
    ::metrics::gauge!("custody_network_alive", "network" => network.to_string())
        .set(if alive { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_dispatch("withdraw", "success");
        record_event_ingested("duplicate");
        record_confirmation("pending");
        record_cycle_duration(Duration::from_millis(5));
        record_network_alive("testnet", true);
    }
}
