//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming connection (TCP or Unix)
//!     → listener.rs (bind, permissions, accept)
//!     → connection.rs (line framing, forced close)
//!     → Hand off to the connection handler
//!
//! Connection States:
//!     Active → Closed (peer EOF, I/O error, or forced close on shutdown)
//! ```
//!
//! # Design Decisions
//! - One `Stream` type covers both socket kinds
//! - Forced close is a signal, not a task abort; the handler's pending I/O fails
//! - Unix socket paths are removed when the listener closes
//! - The accept loop sees listeners only through [`Accept`]

pub mod connection;
pub mod listener;
pub mod unix;

pub use connection::{CloseHandle, Connection, ConnectionError, ConnectionId};
pub use listener::{Accept, Listener, ListenerError, PeerAddr, Stream};
