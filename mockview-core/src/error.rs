use thiserror::Error;

/// All errors produced by mockview-core.
///
/// The first five variants are the session error taxonomy. Device and
/// connection errors are surfaced to the user; decode, protocol and timeout
/// conditions are logged where they happen and never stop a session.
#[derive(Debug, Error)]
pub enum MockviewError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    #[error("failed to decode playback segment: {0}")]
    DecodeFailure(String),

    #[error("protocol anomaly: {0}")]
    ProtocolAnomaly(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("interview API returned {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("session is not running")]
    NotRunning,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MockviewError {
    /// Whether this error should be shown to the candidate.
    ///
    /// Decode failures, protocol anomalies and turn-gate timeouts are
    /// swallowed locally and only logged.
    pub fn is_user_facing(&self) -> bool {
        !matches!(
            self,
            MockviewError::DecodeFailure(_)
                | MockviewError::ProtocolAnomaly(_)
                | MockviewError::Timeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MockviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_device_connection_and_api_errors_are_user_facing() {
        assert!(MockviewError::DeviceUnavailable("denied".into()).is_user_facing());
        assert!(MockviewError::ConnectionUnavailable("refused".into()).is_user_facing());
        assert!(MockviewError::Api {
            status: 404,
            detail: "Session not found".into()
        }
        .is_user_facing());
        assert!(!MockviewError::DecodeFailure("odd length".into()).is_user_facing());
        assert!(!MockviewError::ProtocolAnomaly("bogus".into()).is_user_facing());
        assert!(!MockviewError::Timeout("turn gate".into()).is_user_facing());
    }
}
