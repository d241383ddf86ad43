use crate::probe::{OutcomeKind, STATUS_OK, STATUS_TOO_MANY_REQUESTS};
use serde::{Deserialize, Serialize};

/// Running totals for a load-generation session. Counters only grow.
///
/// `allowed` counts status 200 and `blocked` counts status 429; everything
/// else, including transport failures, only bumps `sent`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    pub sent: u64,
    pub allowed: u64,
    pub blocked: u64,
}

impl LoadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: OutcomeKind) {
        self.sent += 1;
        match kind.status() {
            STATUS_OK => self.allowed += 1,
            STATUS_TOO_MANY_REQUESTS => self.blocked += 1,
            _ => {}
        }
    }

    /// Outcomes that were neither 200 nor 429.
    pub fn other(&self) -> u64 {
        self.sent - self.allowed - self.blocked
    }

    /// Share of sent probes that were allowed, in whole percent.
    pub fn allowed_percent(&self) -> u64 {
        if self.sent == 0 {
            return 0;
        }
        (self.allowed * 100) / self.sent
    }
}
