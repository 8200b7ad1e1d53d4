//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Resolve config → Start metrics → Bind listener
//!
//! Shutdown (shutdown.rs + drain.rs):
//!     Latch set → Accept loop closes listener → Supervisors close connections
//!     → Handlers return → Drain barrier reaches zero → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then metrics, then listener
//! - Shutdown is a one-way latch, never reset
//! - Every spawned task holds a drain unit released on drop

pub mod drain;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use drain::{DrainGuard, DrainTracker};
pub use shutdown::Shutdown;
