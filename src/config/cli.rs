//! Command-line flags.
//!
//! Every flag is optional; a flag that is given overrides the value from the
//! config file (or the built-in default when no file is used).

use std::path::PathBuf;

use clap::Parser;

use crate::config::schema::{Network, PolicydConfig};

#[derive(Debug, Parser)]
#[command(name = "tls-policyd")]
#[command(version, about = "Policy delegation daemon deciding on peer transport encryption", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Listen address: host:port for tcp, socket path for unix [default: :10000]
    #[arg(long)]
    pub listen: Option<String>,

    /// Listener kind [default: tcp]
    #[arg(long, value_enum)]
    pub network: Option<Network>,

    /// Action when the request carried no encryption indicator [default: reject]
    #[arg(long = "notls")]
    pub no_tls_action: Option<String>,

    /// Action when the request carried an encryption indicator [default: dunno]
    #[arg(long = "tls")]
    pub tls_action: Option<String>,

    /// Unix socket permissions, e.g. 0660 (when --network unix) [default: 0660]
    #[arg(long, value_parser = parse_mode)]
    pub perm: Option<u32>,

    /// Unix socket owner (when --network unix)
    #[arg(long)]
    pub user: Option<String>,

    /// Unix socket group (when --network unix)
    #[arg(long)]
    pub group: Option<String>,

    /// Log level when RUST_LOG is unset [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(self, config: &mut PolicydConfig) {
        if let Some(listen) = self.listen {
            config.listener.address = listen;
        }
        if let Some(network) = self.network {
            config.listener.network = network;
        }
        if let Some(action) = self.no_tls_action {
            config.policy.no_tls_action = action;
        }
        if let Some(action) = self.tls_action {
            config.policy.tls_action = action;
        }
        if let Some(mode) = self.perm {
            config.listener.unix.mode = mode;
        }
        if self.user.is_some() {
            config.listener.unix.user = self.user;
        }
        if self.group.is_some() {
            config.listener.unix.group = self.group;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

/// Parse a file mode the way C-style integer literals read: a leading `0`
/// or `0o` means octal, `0x` hex, anything else decimal.
fn parse_mode(value: &str) -> Result<u32, String> {
    let parsed = if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else if let Some(octal) = value.strip_prefix("0o") {
        u32::from_str_radix(octal, 8)
    } else if value.len() > 1 && value.starts_with('0') {
        u32::from_str_radix(&value[1..], 8)
    } else {
        value.parse()
    };
    parsed.map_err(|e| format!("invalid mode {value:?}: {e}"))
}
