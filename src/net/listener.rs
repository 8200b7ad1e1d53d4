//! Listening socket: TCP or Unix-domain.
//!
//! # Responsibilities
//! - Bind to the configured address or socket path
//! - Apply Unix socket permissions and ownership
//! - Accept incoming connections as a single [`Stream`] type
//! - Remove the Unix socket path when the listener is closed

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};

use crate::config::{ListenerConfig, Network};
use crate::net::unix::{self, UmaskGuard};

/// Error type for listener setup.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to set the socket file mode.
    #[error("Failed to set socket permissions: {0}")]
    Permissions(#[source] io::Error),

    /// Failed to look up or change the socket owner.
    #[error("Failed to set socket owner: {0}")]
    Owner(#[source] io::Error),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Unknown group: {0}")]
    UnknownGroup(String),
}

/// Remote end of an accepted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAddr {
    Tcp(SocketAddr),
    Unix(Option<PathBuf>),
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddr::Tcp(addr) => write!(f, "{}", addr),
            PeerAddr::Unix(Some(path)) => write!(f, "unix:{}", path.display()),
            PeerAddr::Unix(None) => write!(f, "unix:unnamed"),
        }
    }
}

/// A source of accepted connections, as driven by the accept loop.
pub trait Accept: fmt::Display + Send + Sync + 'static {
    /// Accept the next connection. Must be cancel-safe.
    fn accept(&self) -> impl Future<Output = io::Result<(Stream, PeerAddr)>> + Send;

    /// Stop accepting for good.
    fn close(self);
}

/// Unix listener that unlinks its socket path when dropped.
#[derive(Debug)]
pub struct UnixSocket {
    inner: UnixListener,
    path: PathBuf,
}

impl UnixSocket {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixSocket {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "Failed to remove socket file");
        }
    }
}

/// A bound, accepting endpoint. Closed by dropping it (see [`Listener::close`]).
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixSocket),
}

impl Listener {
    /// Bind according to `config`, applying Unix socket permissions if needed.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let listener = match config.network {
            Network::Tcp => {
                let address = tcp_bind_address(&config.address);
                let bound = TcpListener::bind(address.as_str()).await;
                let inner = bound.map_err(|source| ListenerError::Bind { address, source })?;
                Listener::Tcp(inner)
            }
            Network::Unix => {
                let path = PathBuf::from(&config.address);
                let inner = {
                    let _umask = UmaskGuard::set(0o777);
                    UnixListener::bind(&path).map_err(|source| ListenerError::Bind {
                        address: config.address.clone(),
                        source,
                    })?
                };
                // Dropping `socket` on error below closes and unlinks it.
                let socket = UnixSocket { inner, path };
                unix::apply_permissions(&socket.path, &config.unix)?;
                Listener::Unix(socket)
            }
        };

        tracing::info!(network = %config.network, address = %listener, "Listener bound");
        Ok(listener)
    }

    /// Accept the next connection.
    ///
    /// Cancel-safe: dropping the future before it completes loses no connection.
    pub async fn accept(&self) -> io::Result<(Stream, PeerAddr)> {
        match self {
            Listener::Tcp(inner) => {
                let (stream, addr) = inner.accept().await?;
                Ok((Stream::Tcp(stream), PeerAddr::Tcp(addr)))
            }
            Listener::Unix(socket) => {
                let (stream, addr) = socket.inner.accept().await?;
                let peer = PeerAddr::Unix(addr.as_pathname().map(Path::to_path_buf));
                Ok((Stream::Unix(stream), peer))
            }
        }
    }

    /// Bound TCP address, if this is a TCP listener.
    pub fn tcp_addr(&self) -> Option<SocketAddr> {
        match self {
            Listener::Tcp(inner) => inner.local_addr().ok(),
            Listener::Unix(_) => None,
        }
    }

    /// Stop listening. Pending and future accepts are impossible afterwards.
    pub fn close(self) {
        tracing::info!(address = %self, "Listener closed");
    }
}

impl Accept for Listener {
    fn accept(&self) -> impl Future<Output = io::Result<(Stream, PeerAddr)>> + Send {
        Listener::accept(self)
    }

    fn close(self) {
        Listener::close(self)
    }
}

impl From<TcpListener> for Listener {
    fn from(inner: TcpListener) -> Self {
        Listener::Tcp(inner)
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Tcp(inner) => match inner.local_addr() {
                Ok(addr) => write!(f, "{}", addr),
                Err(_) => write!(f, "tcp:unknown"),
            },
            Listener::Unix(socket) => write!(f, "unix:{}", socket.path.display()),
        }
    }
}

/// `:port` means every interface.
fn tcp_bind_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{}", address)
    } else {
        address.to_string()
    }
}

/// An accepted connection of either socket kind.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_flush(cx),
            Stream::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
