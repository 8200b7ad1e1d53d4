//! Decisions and the configured action strings they map to.

use crate::config::PolicyConfig;

/// Outcome of one completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The request carried a non-empty encryption indicator.
    Tls,
    /// No encryption indicator, or an empty one.
    NoTls,
}

impl Verdict {
    /// Short label used for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Tls => "tls",
            Verdict::NoTls => "notls",
        }
    }
}

/// The two pass-through action strings a verdict selects between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actions {
    tls: String,
    no_tls: String,
}

impl Actions {
    pub fn new(tls: impl Into<String>, no_tls: impl Into<String>) -> Self {
        Self {
            tls: tls.into(),
            no_tls: no_tls.into(),
        }
    }

    /// The action string for a verdict.
    pub fn action(&self, verdict: Verdict) -> &str {
        match verdict {
            Verdict::Tls => &self.tls,
            Verdict::NoTls => &self.no_tls,
        }
    }

    /// Render the wire reply: `action=<value>` followed by a blank line.
    pub fn reply(&self, verdict: Verdict) -> String {
        format!("action={}\n\n", self.action(verdict))
    }
}

impl From<&PolicyConfig> for Actions {
    fn from(config: &PolicyConfig) -> Self {
        Self::new(config.tls_action.clone(), config.no_tls_action.clone())
    }
}
