//! OS signal handling.
//!
//! SIGINT and SIGTERM both trip the shutdown latch. Repeated signals are
//! harmless: the latch is one-way.

use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;

use crate::lifecycle::Shutdown;

/// Wait for the next SIGINT or SIGTERM and return its name.
pub async fn wait_for_signal() -> std::io::Result<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => Ok("SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

/// Translate termination signals into `shutdown.trigger()` in the background.
pub fn spawn_signal_handler(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match wait_for_signal().await {
                Ok(name) => {
                    if shutdown.trigger() {
                        tracing::info!(signal = name, "Terminating");
                    } else {
                        tracing::debug!(signal = name, "Already draining");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to register signal handlers");
                    return;
                }
            }
        }
    })
}
