//! Metrics collection and exposition.
//!
//! # Metrics
//! - `envelope_created_total` (counter): envelopes built (the API is not known yet)
//! - `envelope_attempts_total` (counter): forwarding attempts, by api
//! - `envelope_settled_total` (counter): completions, by outcome
//! - `envelope_expired_total` (counter): envelopes failed on their deadline
//! - `envelope_contract_violations_total` (counter): double settlements

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP scrape listener.
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_envelope_created() {
    ::metrics::counter!("envelope_created_total").increment(1);
}

pub fn record_attempt(api: &str) {
    ::metrics::counter!("envelope_attempts_total", "api" => api.to_string()).increment(1);
}

pub fn record_settled(outcome: &'static str) {
    ::metrics::counter!("envelope_settled_total", "outcome" => outcome).increment(1);
}

pub fn record_expired() {
    ::metrics::counter!("envelope_expired_total").increment(1);
}

pub fn record_contract_violation() {
    ::metrics::counter!("envelope_contract_violations_total").increment(1);
}

