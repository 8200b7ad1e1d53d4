//! TLS policy delegation daemon library.

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod policy;
pub mod server;

pub use config::schema::PolicydConfig;
pub use lifecycle::Shutdown;
pub use server::PolicyServer;
