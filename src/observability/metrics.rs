//! Metrics collection and exposition.
//!
//! # Metrics
//! - `policyd_connections_accepted_total` (counter)
//! - `policyd_active_connections` (gauge)
//! - `policyd_decisions_total` (counter): labelled `verdict` = `tls` | `notls`
//! - `policyd_connection_errors_total` (counter): unexpected connection failures
//! - `policyd_accept_errors_total` (counter)
//!
//! Without an installed exporter every call here is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::policy::Verdict;

pub const CONNECTIONS_ACCEPTED: &str = "policyd_connections_accepted_total";
pub const ACTIVE_CONNECTIONS: &str = "policyd_active_connections";
pub const DECISIONS: &str = "policyd_decisions_total";
pub const CONNECTION_ERRORS: &str = "policyd_connection_errors_total";
pub const ACCEPT_ERRORS: &str = "policyd_accept_errors_total";

/// Label on [`DECISIONS`]. Values come from [`Verdict::as_str`], never from
/// the configured action strings, so the label set stays bounded.
pub const VERDICT_LABEL: &str = "verdict";

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_opened() {
    counter!(CONNECTIONS_ACCEPTED).increment(1);
    gauge!(ACTIVE_CONNECTIONS).increment(1.0);
}

pub fn record_connection_closed() {
    gauge!(ACTIVE_CONNECTIONS).decrement(1.0);
}

pub fn record_decision(verdict: Verdict) {
    counter!(DECISIONS, VERDICT_LABEL => verdict.as_str()).increment(1);
}

pub fn record_connection_error() {
    counter!(CONNECTION_ERRORS).increment(1);
}

pub fn record_accept_error() {
    counter!(ACCEPT_ERRORS).increment(1);
}
