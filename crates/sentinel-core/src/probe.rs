use serde::{Serialize, Serializer};

pub const MSG_ALLOWED: &str = "Request Allowed";
pub const MSG_LIMITED: &str = "Rate Limit Exceeded";

pub const STATUS_OK: u16 = 200;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;
/// Reported for probes that never got an HTTP response.
pub const STATUS_TRANSPORT_ERROR: u16 = 500;

/// How the rate-limited endpoint answered a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    Allowed,
    /// Any non-success status. 429 is the expected rate-limit signal.
    Blocked(u16),
    TransportError,
}

impl OutcomeKind {
    /// Classify an HTTP status. Every 2xx counts as allowed.
    pub fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            OutcomeKind::Allowed
        } else {
            OutcomeKind::Blocked(status)
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            OutcomeKind::Allowed => STATUS_OK,
            OutcomeKind::Blocked(status) => *status,
            OutcomeKind::TransportError => STATUS_TRANSPORT_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            OutcomeKind::Allowed => MSG_ALLOWED,
            OutcomeKind::Blocked(_) | OutcomeKind::TransportError => MSG_LIMITED,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == STATUS_TOO_MANY_REQUESTS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub kind: OutcomeKind,
    /// Local time the response (or failure) arrived
    pub timestamp: String,
}

impl ProbeOutcome {
    pub fn new(kind: OutcomeKind, timestamp: String) -> Self {
        Self { kind, timestamp }
    }

    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    pub fn message(&self) -> &'static str {
        self.kind.message()
    }
}

impl Serialize for ProbeOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("ProbeOutcome", 3)?;
        s.serialize_field("status", &self.status())?;
        s.serialize_field("timestamp", &self.timestamp)?;
        s.serialize_field("message", self.message())?;
        s.end()
    }
}

/// A log line: an outcome plus its unique, strictly increasing id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub id: u64,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}
