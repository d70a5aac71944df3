// metrics/mod.rs
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

pub const MALFORMED_PAYLOADS: &str = "signal_sync_malformed_payloads_total";
pub const UNKNOWN_DEVICE_ACTIONS: &str = "signal_sync_unknown_device_actions_total";
pub const ACTIONS_APPLIED: &str = "signal_sync_actions_applied_total";
pub const CONNECT_ATTEMPTS: &str = "signal_sync_connect_attempts_total";
pub const CONNECT_FAILURES: &str = "signal_sync_connect_failures_total";
pub const CONNECTED: &str = "signal_sync_connected";

/// Serves the Prometheus scrape endpoint. Needs a running tokio runtime.
pub fn setup_metrics(port: u16) -> Result<(), BuildError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_malformed_payload() {
    counter!(MALFORMED_PAYLOADS).increment(1);
}

pub fn record_unknown_device() {
    counter!(UNKNOWN_DEVICE_ACTIONS).increment(1);
}

pub fn record_action_applied() {
    counter!(ACTIONS_APPLIED).increment(1);
}

pub fn record_connect_attempt() {
    counter!(CONNECT_ATTEMPTS).increment(1);
}

pub fn record_connect_failure() {
    counter!(CONNECT_FAILURES).increment(1);
}

pub fn set_connected(connected: bool) {
    gauge!(CONNECTED).set(if connected { 1.0 } else { 0.0 });
}
