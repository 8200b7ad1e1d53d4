//! TLS policy delegation daemon.
//!
//! Answers policy requests with one of two configured actions depending on
//! whether the client's connection negotiated transport encryption.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGINT/SIGTERM ──▶ lifecycle::signals ──▶ Shutdown latch
//!                                                  │
//!        ┌─────────────────────────────────────────┼──────────────┐
//!        ▼                                         ▼              ▼
//!   net::listener ──▶ server (accept loop) ──▶ handler ◀── supervisor
//!                                                │
//!                                                ▼
//!                                   policy::parser → action=<value>
//! ```
//!
//! The process exits once the drain barrier reports that the accept loop and
//! every connection have retired.

use std::process::ExitCode;

use clap::Parser;

use tls_policyd::config::cli::Cli;
use tls_policyd::config::loader;
use tls_policyd::lifecycle::{signals, startup, Shutdown};
use tls_policyd::observability::logging;
use tls_policyd::PolicyServer;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match loader::resolve(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tls-policyd starting");

    tracing::info!(
        network = %config.listener.network,
        address = %config.listener.address,
        tls_action = %config.policy.tls_action,
        no_tls_action = %config.policy.no_tls_action,
        "Configuration loaded"
    );

    let listener = match startup::prepare(&config).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    PolicyServer::new(&config).run(listener, shutdown).await;

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
