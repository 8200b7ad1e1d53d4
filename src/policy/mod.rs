//! Policy protocol subsystem.
//!
//! # Data Flow
//! ```text
//! Connection lines
//!     → parser.rs (accumulate attributes until blank line)
//!     → decision.rs (verdict → configured action string)
//!     → `action=<value>\n\n` written back
//! ```
//!
//! # Design Decisions
//! - Parser state is private to one connection
//! - Unknown attributes are ignored
//! - Action strings are opaque pass-through values

pub mod decision;
pub mod parser;

pub use decision::{Actions, Verdict};
pub use parser::RequestParser;
