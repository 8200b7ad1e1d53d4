//! Policy server: accept loop and drain.
//!
//! # Responsibilities
//! - Accept connections until shutdown begins
//! - Spawn a handler and supervisor per connection
//! - Tell expected accept failures (listener closing) from real ones
//! - Return only once every connection has retired
//!
//! # Design Decisions
//! - The accept loop holds a drain unit of its own, so the barrier cannot
//!   release while new connections might still be spawned
//! - Transient accept errors are logged and never stop the loop

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConnectionConfig, PolicydConfig};
use crate::lifecycle::{DrainGuard, DrainTracker, Shutdown};
use crate::net::Accept;
use crate::observability::metrics;
use crate::policy::Actions;

pub mod handler;

/// The policy delegation server.
#[derive(Debug, Clone)]
pub struct PolicyServer {
    actions: Arc<Actions>,
    connection: ConnectionConfig,
    shutdown_timeout: Option<Duration>,
}

impl PolicyServer {
    /// Create a new server with the given configuration.
    pub fn new(config: &PolicydConfig) -> Self {
        Self {
            actions: Arc::new(Actions::from(&config.policy)),
            connection: config.connection.clone(),
            shutdown_timeout: config.shutdown.timeout_secs.map(Duration::from_secs),
        }
    }

    /// Serve `listener` until `shutdown` is triggered and all work has drained.
    pub async fn run<L: Accept>(self, listener: L, shutdown: Shutdown) {
        tracing::info!(address = %listener, "Policy server starting");

        let drain = DrainTracker::new();
        let unit = drain.track("accept-loop");
        let shutdown_timeout = self.shutdown_timeout;
        tokio::spawn(self.accept_loop(listener, shutdown.clone(), drain.clone(), unit));

        if drain_within(&drain, &shutdown, shutdown_timeout).await {
            tracing::info!("Policy server stopped");
        }
    }

    async fn accept_loop<L: Accept>(
        self,
        listener: L,
        shutdown: Shutdown,
        drain: DrainTracker,
        _unit: DrainGuard,
    ) {
        let backoff = Duration::from_millis(self.connection.accept_error_backoff_ms);

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    // Registered before the tasks exist so the barrier sees them.
                    let unit = drain.track("connection");
                    handler::spawn_connection(
                        stream,
                        peer,
                        Arc::clone(&self.actions),
                        &self.connection,
                        shutdown.clone(),
                        unit,
                    );
                }
                Err(_) if shutdown.is_triggered() => break,
                Err(e) => {
                    metrics::record_accept_error();
                    tracing::error!(error = %e, "Accept failed");
                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        listener.close();
        tracing::debug!("Accept loop stopped");
    }
}

/// Wait for every unit in `drain` to retire.
///
/// With a `limit`, give up once it has elapsed since shutdown was triggered.
/// Returns `false` if the deadline won.
async fn drain_within(drain: &DrainTracker, shutdown: &Shutdown, limit: Option<Duration>) -> bool {
    let Some(limit) = limit else {
        drain.wait_idle().await;
        return true;
    };

    let deadline = async {
        shutdown.triggered().await;
        tokio::time::sleep(limit).await;
    };

    tokio::select! {
        _ = drain.wait_idle() => true,
        _ = deadline => {
            tracing::warn!(
                outstanding = drain.active_count(),
                timeout_secs = limit.as_secs(),
                "Drain deadline elapsed, abandoning remaining connections"
            );
            false
        }
    }
}
