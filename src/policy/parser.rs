//! Per-connection request state machine.
//!
//! Attribute lines accumulate into the current request until a blank line
//! terminates it. Only `encryption_protocol=` is interpreted; every other
//! attribute is ignored so newer clients keep working.

use super::decision::Verdict;

const ENCRYPTION_ATTRIBUTE: &str = "encryption_protocol=";

/// Accumulates one request at a time for a single connection.
#[derive(Debug, Default)]
pub struct RequestParser {
    encryption: String,
}

impl RequestParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator).
    ///
    /// Returns a verdict when the line ends a request, after which the
    /// parser is ready for the next request on the same connection.
    pub fn feed(&mut self, line: &str) -> Option<Verdict> {
        if line.is_empty() {
            let verdict = if self.encryption.is_empty() {
                Verdict::NoTls
            } else {
                Verdict::Tls
            };
            self.encryption.clear();
            return Some(verdict);
        }

        if let Some(value) = line.strip_prefix(ENCRYPTION_ATTRIBUTE) {
            // First whitespace-delimited token; `encryption_protocol=` alone stores "".
            let token = value.split_whitespace().next().unwrap_or("");
            self.encryption.clear();
            self.encryption.push_str(token);
        }

        None
    }

    /// Encryption indicator seen so far in the current request.
    pub fn encryption(&self) -> &str {
        &self.encryption
    }
}
