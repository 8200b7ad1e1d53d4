//! Startup orchestration.
//!
//! # Responsibilities
//! - Start the metrics exporter when configured
//! - Bind the listener (and apply Unix socket permissions)
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and maps to exit code 1
//! - The listener is bound last so nothing is accepted before the daemon is ready

use thiserror::Error;

use crate::config::PolicydConfig;
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;

/// Anything that stops the daemon from starting to serve.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Bring up everything the server needs and return the ready listener.
pub async fn prepare(config: &PolicydConfig) -> Result<Listener, StartupError> {
    if let Some(addr) = &config.observability.metrics_address {
        // Validation already checked the address parses.
        if let Ok(addr) = addr.parse() {
            metrics::init_metrics(addr)?;
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    Ok(listener)
}
