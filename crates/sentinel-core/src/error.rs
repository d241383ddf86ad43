use thiserror::Error;

/// Why a single request against the monitored service did not produce a
/// usable answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network unreachable, DNS failure, connection reset, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, FetchError::Transport(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return FetchError::Malformed(err.to_string());
        }
        match err.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None => FetchError::Transport(err.to_string()),
        }
    }
}
