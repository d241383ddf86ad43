use crate::error::FetchError;
use crate::history::BoundedLog;
use serde::{Deserialize, Serialize};

/// Cumulative counters reported by the rate limiter's metrics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub allowed_requests: u64,
    pub blocked_requests: u64,
    pub redis_errors: u64,
}

/// One chart sample, labelled with the local wall-clock time it arrived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: String,
    pub allowed: u64,
    pub blocked: u64,
}

impl TimeSeriesPoint {
    pub fn from_snapshot(timestamp: String, snapshot: &MetricsSnapshot) -> Self {
        Self {
            timestamp,
            allowed: snapshot.allowed_requests,
            blocked: snapshot.blocked_requests,
        }
    }
}

/// Result of one metrics poll as delivered to the sampler's collector.
#[derive(Debug, Clone)]
pub struct PollResult {
    /// Local time at completion
    pub timestamp: String,
    pub outcome: Result<MetricsSnapshot, FetchError>,
}

/// Everything the dashboard renders. Owned by the sampler's collector task
/// and published by value after every poll.
#[derive(Debug, Clone, Serialize)]
pub struct SamplerState {
    pub history: BoundedLog<TimeSeriesPoint>,
    pub connected: bool,
    pub latest: Option<MetricsSnapshot>,
    pub polls: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

impl SamplerState {
    pub fn new(history_len: usize) -> Self {
        Self {
            history: BoundedLog::new(history_len),
            connected: false,
            latest: None,
            polls: 0,
            failures: 0,
            last_error: None,
        }
    }

    /// Fold one poll result. Failures flip connectivity and leave the
    /// history untouched; there is no zero-filling.
    pub fn apply(&mut self, result: PollResult) {
        self.polls += 1;
        match result.outcome {
            Ok(snapshot) => {
                self.connected = true;
                self.latest = Some(snapshot);
                self.last_error = None;
                self.history
                    .push(TimeSeriesPoint::from_snapshot(result.timestamp, &snapshot));
            }
            Err(err) => {
                self.connected = false;
                self.failures += 1;
                self.last_error = Some(err.to_string());
            }
        }
    }
}

/// Local wall-clock time used for chart and log labels.
pub fn local_time_label() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
