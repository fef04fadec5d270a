use std::collections::BTreeMap;

use tracing::info;

use crate::domain::Decision;

/// Per-instance request counters.
///
/// One helper instance handles one request at a time, so plain integers
/// are enough. The proxy sees none of this; it is logged on shutdown.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HelperMetrics {
    /// Total request lines answered
    pub requests_total: u64,

    /// Requests by outcome
    pub allowed: u64,
    pub denied: u64,
    pub errors: u64,

    /// Errors by kind (see `AclError::kind`)
    pub errors_by_kind: BTreeMap<&'static str, u64>,

    /// Times a connection to the policy store was attempted
    pub connect_attempts: u64,
}

impl HelperMetrics {
    pub fn new() -> Self {
        HelperMetrics::default()
    }

    /// Record a decision outcome.
    pub fn record_decision(&mut self, decision: &Decision) {
        self.requests_total += 1;

        match decision {
            Decision::Allow => self.allowed += 1,
            Decision::Deny(_) => self.denied += 1,
            Decision::Error(err) => {
                self.errors += 1;
                *self.errors_by_kind.entry(err.kind()).or_default() += 1;
            }
        }
    }

    /// Record an attempt to (re)connect to the policy store.
    pub fn record_connect_attempt(&mut self) {
        self.connect_attempts += 1;
    }

    /// Log the counters at info level.
    pub fn log_summary(&self) {
        info!(
            requests = self.requests_total,
            allowed = self.allowed,
            denied = self.denied,
            errors = self.errors,
            errors_by_kind = ?self.errors_by_kind,
            connect_attempts = self.connect_attempts,
            "Request summary"
        );
    }
}
