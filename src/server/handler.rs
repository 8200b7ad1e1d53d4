//! Per-connection handler and its supervisor.
//!
//! Each accepted connection gets two tasks:
//! - the handler, which reads lines, drives a [`RequestParser`] and writes
//!   one reply per completed request;
//! - the supervisor, which waits for either the handler to finish or shutdown
//!   to begin. On shutdown it force-closes the connection and still waits for
//!   the handler before retiring the connection's drain unit.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::config::ConnectionConfig;
use crate::lifecycle::{DrainGuard, Shutdown};
use crate::net::{CloseHandle, Connection, ConnectionError, ConnectionId, PeerAddr};
use crate::observability::metrics;
use crate::policy::{Actions, RequestParser};

/// Sends the completion signal when the handler exits, however it exits.
struct CompletionGuard {
    tx: Option<oneshot::Sender<()>>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Start the handler and supervisor for one accepted stream.
///
/// `unit` must have been registered with the drain tracker before this call;
/// it is retired once both tasks are done.
pub fn spawn_connection<S>(
    stream: S,
    peer: PeerAddr,
    actions: Arc<Actions>,
    config: &ConnectionConfig,
    shutdown: Shutdown,
    unit: DrainGuard,
) -> ConnectionId
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (connection, close) = Connection::new(stream, peer, config);
    let id = connection.id();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(supervise(id, close, done_rx, shutdown.clone(), unit));
    tokio::spawn(async move {
        let _completion = CompletionGuard { tx: Some(done_tx) };
        handle_connection(connection, &actions, &shutdown).await;
    });

    id
}

async fn supervise(
    id: ConnectionId,
    close: CloseHandle,
    mut done: oneshot::Receiver<()>,
    shutdown: Shutdown,
    _unit: DrainGuard,
) {
    tokio::select! {
        _ = &mut done => {}
        _ = shutdown.triggered() => {
            if close.close() {
                tracing::trace!(connection_id = %id, "Force-closing connection");
            }
            // The handler still owns the stream; wait for it to let go.
            let _ = done.await;
        }
    }
}

async fn handle_connection<S>(mut connection: Connection<S>, actions: &Actions, shutdown: &Shutdown)
where
    S: AsyncRead + AsyncWrite,
{
    let id = connection.id();
    let peer = connection.peer().to_string();
    metrics::record_connection_opened();
    tracing::debug!(connection_id = %id, peer = %peer, "Connection opened");

    match serve_requests(&mut connection, actions).await {
        Ok(requests) => {
            tracing::debug!(connection_id = %id, peer = %peer, requests, "Connection closed by peer");
        }
        Err(e) if shutdown.is_triggered() => {
            tracing::trace!(connection_id = %id, error = %e, "Connection ended by shutdown");
        }
        Err(e) => {
            metrics::record_connection_error();
            tracing::warn!(connection_id = %id, peer = %peer, error = %e, "Connection failed");
        }
    }

    metrics::record_connection_closed();
}

/// Read requests until the peer ends the stream. Returns the number served.
async fn serve_requests<S>(
    connection: &mut Connection<S>,
    actions: &Actions,
) -> Result<u64, ConnectionError>
where
    S: AsyncRead + AsyncWrite,
{
    let mut parser = RequestParser::new();
    let mut served = 0;

    while let Some(line) = connection.next_line().await {
        let line = line?;
        if let Some(verdict) = parser.feed(&line) {
            connection.write_reply(&actions.reply(verdict)).await?;
            metrics::record_decision(verdict);
            tracing::trace!(connection_id = %connection.id(), action = actions.action(verdict), "Decision sent");
            served += 1;
        }
    }

    Ok(served)
}
