//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the policy daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PolicydConfig {
    /// Listening socket (TCP or Unix-domain).
    pub listener: ListenerConfig,

    /// Action strings returned to clients.
    pub policy: PolicyConfig,

    /// Per-connection limits.
    pub connection: ConnectionConfig,

    /// Drain behaviour on termination.
    pub shutdown: ShutdownConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Kind of listening socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Tcp,
    Unix,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Unix => write!(f, "unix"),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Socket kind.
    pub network: Network,

    /// `host:port` for TCP (an empty host binds all interfaces, e.g. ":10000"),
    /// or a filesystem path for Unix sockets.
    pub address: String,

    /// Socket file mode and ownership, applied only when `network = "unix"`.
    pub unix: UnixSocketConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            address: ":10000".to_string(),
            unix: UnixSocketConfig::default(),
        }
    }
}

/// Unix socket permission and ownership settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UnixSocketConfig {
    /// File mode for the socket path.
    pub mode: u32,

    /// Owning user name.
    pub user: Option<String>,

    /// Owning group name.
    pub group: Option<String>,
}

impl Default for UnixSocketConfig {
    fn default() -> Self {
        Self {
            mode: 0o660,
            user: None,
            group: None,
        }
    }
}

/// Action strings, passed through verbatim to clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Returned when the request carried an encryption indicator.
    pub tls_action: String,

    /// Returned when it did not.
    pub no_tls_action: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            tls_action: "dunno".to_string(),
            no_tls_action: "reject".to_string(),
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Close a connection that sends nothing for this long. Unset means never.
    pub idle_timeout_secs: Option<u64>,

    /// Maximum accepted line length in bytes. Unset means unlimited.
    pub max_line_length: Option<usize>,

    /// Pause after a failed accept before retrying, in milliseconds.
    pub accept_error_backoff_ms: u64,
}

/// Shutdown settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Give up waiting for connections to drain after this long.
    /// Unset means wait for every connection.
    pub timeout_secs: Option<u64>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Prometheus endpoint bind address. Unset disables the exporter.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_address: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PolicydConfig::default();
        assert_eq!(config.listener.network, Network::Tcp);
        assert_eq!(config.listener.address, ":10000");
        assert_eq!(config.listener.unix.mode, 0o660);
        assert_eq!(config.policy.tls_action, "dunno");
        assert_eq!(config.policy.no_tls_action, "reject");
        assert!(config.connection.idle_timeout_secs.is_none());
        assert!(config.shutdown.timeout_secs.is_none());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: PolicydConfig = toml::from_str(
            r#"
            [listener]
            network = "unix"
            address = "/run/tls-policyd.sock"

            [listener.unix]
            group = "postfix"

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.network, Network::Unix);
        assert_eq!(config.listener.unix.mode, 0o660);
        assert_eq!(config.listener.unix.group.as_deref(), Some("postfix"));
        assert_eq!(config.policy.no_tls_action, "reject");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn unknown_network_is_rejected() {
        let result: Result<PolicydConfig, _> = toml::from_str("[listener]\nnetwork = \"udp\"\n");
        assert!(result.is_err());
    }
}
