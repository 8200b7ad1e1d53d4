//! Accepted connection: line framing, replies, and forced closure.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Frame the inbound byte stream into lines
//! - Let a supervisor force-close the connection from another task
//!
//! A forced close fails the connection's current or next I/O, whether that is
//! a read waiting for the peer or a reply the peer is not draining.
//!
//! Lines are framed on raw bytes. Bytes that are not valid UTF-8 are replaced
//! rather than rejected, so an attribute the parser ignores can never end the
//! connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};

use crate::config::ConnectionConfig;
use crate::net::listener::PeerAddr;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Why a connection stopped before the peer ended the stream.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line exceeds maximum length")]
    LineTooLong,

    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),

    #[error("connection closed")]
    Closed,
}

impl From<AnyDelimiterCodecError> for ConnectionError {
    fn from(err: AnyDelimiterCodecError) -> Self {
        match err {
            AnyDelimiterCodecError::MaxChunkLengthExceeded => ConnectionError::LineTooLong,
            AnyDelimiterCodecError::Io(e) => ConnectionError::Io(e),
        }
    }
}

/// Force-closes a connection from outside its handler.
///
/// Closing is idempotent, and closing after the connection is gone is a no-op.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    /// Close the connection. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

#[derive(Debug)]
struct CloseSignal {
    rx: watch::Receiver<bool>,
}

impl CloseSignal {
    fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }

    async fn closed(&mut self) {
        let signalled = self.rx.wait_for(|closed| *closed).await.is_ok();
        if !signalled {
            // Every handle dropped without closing: this connection can no
            // longer be force-closed.
            std::future::pending::<()>().await;
        }
    }
}

/// One accepted peer, split into a line reader and a reply writer.
#[derive(Debug)]
pub struct Connection<S> {
    id: ConnectionId,
    peer: PeerAddr,
    lines: FramedRead<ReadHalf<S>, AnyDelimiterCodec>,
    writer: WriteHalf<S>,
    closed: CloseSignal,
    idle_timeout: Option<Duration>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Wrap `stream`, returning the connection and the handle that closes it.
    pub fn new(stream: S, peer: PeerAddr, config: &ConnectionConfig) -> (Self, CloseHandle) {
        let codec = match config.max_line_length {
            Some(max) => AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), max),
            None => AnyDelimiterCodec::new(b"\n".to_vec(), b"\n".to_vec()),
        };
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = watch::channel(false);

        let connection = Self {
            id: ConnectionId::new(),
            peer,
            lines: FramedRead::new(reader, codec),
            writer,
            closed: CloseSignal { rx },
            idle_timeout: config.idle_timeout_secs.map(Duration::from_secs),
        };
        (connection, CloseHandle { tx: Arc::new(tx) })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    /// Read the next line, without its `\n` or `\r\n` terminator.
    ///
    /// `None` means the peer ended the stream. Invalid UTF-8 is replaced with
    /// U+FFFD.
    pub async fn next_line(&mut self) -> Option<Result<String, ConnectionError>> {
        let Self {
            lines,
            closed,
            idle_timeout,
            ..
        } = self;

        if closed.is_closed() {
            return Some(Err(ConnectionError::Closed));
        }

        let read = async {
            let line = match *idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, lines.next()).await {
                    Ok(line) => line,
                    Err(_) => return Some(Err(ConnectionError::IdleTimeout(limit))),
                },
                None => lines.next().await,
            };
            line.map(|chunk| -> Result<String, ConnectionError> {
                let chunk = chunk?;
                let line = chunk.strip_suffix(b"\r").unwrap_or(&chunk[..]);
                Ok(String::from_utf8_lossy(line).into_owned())
            })
        };

        tokio::select! {
            biased;
            _ = closed.closed() => Some(Err(ConnectionError::Closed)),
            line = read => line,
        }
    }

    /// Write one reply and flush it.
    ///
    /// A forced close abandons the write, possibly after part of the reply
    /// has reached the peer.
    pub async fn write_reply(&mut self, reply: &str) -> Result<(), ConnectionError> {
        let Self { writer, closed, .. } = self;

        if closed.is_closed() {
            return Err(ConnectionError::Closed);
        }

        let write = async {
            writer.write_all(reply.as_bytes()).await?;
            writer.flush().await
        };

        tokio::select! {
            biased;
            _ = closed.closed() => Err(ConnectionError::Closed),
            written = write => written.map_err(ConnectionError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn peer() -> PeerAddr {
        PeerAddr::Tcp(SocketAddr::from(([127, 0, 0, 1], 4000)))
    }

    fn connect(config: &ConnectionConfig) -> (Connection<DuplexStream>, CloseHandle, DuplexStream) {
        let (client, server) = tokio::io::duplex(1024);
        let (connection, close) = Connection::new(server, peer(), config);
        (connection, close, client)
    }

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
    }

    #[tokio::test]
    async fn reads_lines_until_eof() {
        let (mut conn, _close, mut client) = connect(&ConnectionConfig::default());
        client.write_all(b"a=1\r\n\nlast").await.unwrap();
        drop(client);

        assert_eq!(conn.next_line().await.unwrap().unwrap(), "a=1");
        assert_eq!(conn.next_line().await.unwrap().unwrap(), "");
        assert_eq!(conn.next_line().await.unwrap().unwrap(), "last");
        assert!(conn.next_line().await.is_none());
    }

    #[tokio::test]
    async fn close_unblocks_pending_read() {
        let (mut conn, close, _client) = connect(&ConnectionConfig::default());
        let reader = tokio::spawn(async move { conn.next_line().await });

        tokio::task::yield_now().await;
        assert!(close.close());
        assert!(!close.close());

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("read should be unblocked")
            .unwrap();
        assert!(matches!(result, Some(Err(ConnectionError::Closed))));
    }

    #[tokio::test]
    async fn closed_connection_refuses_writes() {
        let (mut conn, close, _client) = connect(&ConnectionConfig::default());
        close.close();
        assert!(matches!(
            conn.write_reply("action=dunno\n\n").await,
            Err(ConnectionError::Closed)
        ));
    }

    #[tokio::test]
    async fn close_abandons_write_to_stalled_peer() {
        let (client, server) = tokio::io::duplex(64);
        let (mut conn, close) = Connection::new(server, peer(), &ConnectionConfig::default());
        let reply = format!("action={}\n\n", "x".repeat(4096));
        let writer = tokio::spawn(async move { conn.write_reply(&reply).await });

        // The peer never reads, so the write stalls once the buffer is full.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!writer.is_finished());
        close.close();

        let result = tokio::time::timeout(Duration::from_secs(1), writer)
            .await
            .expect("write should be abandoned")
            .unwrap();
        assert!(matches!(result, Err(ConnectionError::Closed)));
        drop(client);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced_not_rejected() {
        let (mut conn, _close, mut client) = connect(&ConnectionConfig::default());
        client
            .write_all(b"helo_name=caf\xe9.example\r\nencryption_protocol=TLSv1.3\n")
            .await
            .unwrap();

        assert_eq!(conn.next_line().await.unwrap().unwrap(), "helo_name=caf\u{fffd}.example");
        assert_eq!(
            conn.next_line().await.unwrap().unwrap(),
            "encryption_protocol=TLSv1.3"
        );
    }

    #[tokio::test]
    async fn dropped_handle_does_not_close() {
        let (mut conn, close, mut client) = connect(&ConnectionConfig::default());
        drop(close);
        client.write_all(b"x=y\n").await.unwrap();
        assert_eq!(conn.next_line().await.unwrap().unwrap(), "x=y");
    }

    #[tokio::test]
    async fn replies_reach_peer() {
        let (mut conn, _close, mut client) = connect(&ConnectionConfig::default());
        conn.write_reply("action=reject\n\n").await.unwrap();
        drop(conn);

        let mut received = String::new();
        client.read_to_string(&mut received).await.unwrap();
        assert_eq!(received, "action=reject\n\n");
    }

    #[tokio::test]
    async fn long_lines_are_rejected_when_limited() {
        let config = ConnectionConfig {
            max_line_length: Some(8),
            ..ConnectionConfig::default()
        };
        let (mut conn, _close, mut client) = connect(&config);
        client.write_all(b"encryption_protocol=TLSv1.3\n").await.unwrap();
        assert!(matches!(
            conn.next_line().await,
            Some(Err(ConnectionError::LineTooLong))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_times_out() {
        let config = ConnectionConfig {
            idle_timeout_secs: Some(5),
            ..ConnectionConfig::default()
        };
        let (mut conn, _close, _client) = connect(&config);
        assert!(matches!(
            conn.next_line().await,
            Some(Err(ConnectionError::IdleTimeout(d))) if d == Duration::from_secs(5)
        ));
    }
}
