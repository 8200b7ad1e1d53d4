//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (mode bits, timeouts > 0)
//! - Reject action strings that would corrupt the wire protocol
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PolicydConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use tracing_subscriber::filter::LevelFilter;

use crate::config::schema::{Network, PolicydConfig};

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a configuration, collecting every error found.
pub fn validate_config(config: &PolicydConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.address.trim().is_empty() {
        errors.push(ValidationError::new("listener.address", "must not be empty"));
    }

    if config.listener.network == Network::Unix && config.listener.unix.mode > 0o7777 {
        errors.push(ValidationError::new(
            "listener.unix.mode",
            format!("{:#o} is not a valid file mode", config.listener.unix.mode),
        ));
    }

    check_action(&mut errors, "policy.tls_action", &config.policy.tls_action);
    check_action(&mut errors, "policy.no_tls_action", &config.policy.no_tls_action);

    if config.connection.idle_timeout_secs == Some(0) {
        errors.push(ValidationError::new(
            "connection.idle_timeout_secs",
            "must be greater than zero (omit to disable)",
        ));
    }
    if config.connection.max_line_length == Some(0) {
        errors.push(ValidationError::new(
            "connection.max_line_length",
            "must be greater than zero (omit for unlimited)",
        ));
    }
    if config.shutdown.timeout_secs == Some(0) {
        errors.push(ValidationError::new(
            "shutdown.timeout_secs",
            "must be greater than zero (omit to wait indefinitely)",
        ));
    }

    if config.observability.log_level.parse::<LevelFilter>().is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }
    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "observability.metrics_address",
                format!("{:?} is not a socket address", addr),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_action(errors: &mut Vec<ValidationError>, field: &'static str, action: &str) {
    if action.contains(['\n', '\r']) {
        errors.push(ValidationError::new(field, "must not contain line breaks"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&PolicydConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = PolicydConfig::default();
        config.listener.address = String::new();
        config.policy.tls_action = "ok\nextra".into();
        config.policy.no_tls_action = "reject\r".into();
        config.shutdown.timeout_secs = Some(0);

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.address",
                "policy.tls_action",
                "policy.no_tls_action",
                "shutdown.timeout_secs",
            ]
        );
    }

    #[test]
    fn empty_actions_pass_through() {
        let mut config = PolicydConfig::default();
        config.policy.tls_action = String::new();
        config.policy.no_tls_action = String::new();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn mode_checked_only_for_unix() {
        let mut config = PolicydConfig::default();
        config.listener.unix.mode = 0o17777;
        assert!(validate_config(&config).is_ok());

        config.listener.network = Network::Unix;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "listener.unix.mode");
    }

    #[test]
    fn rejects_bad_observability_settings() {
        let mut config = PolicydConfig::default();
        config.observability.log_level = "loud".into();
        config.observability.metrics_address = Some("localhost".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
