//! Events broadcast from a voice session to its host.
//!
//! Serialized camelCase with a `type` tag so a host can forward them to a UI
//! or write them to a log unchanged.

use serde::{Deserialize, Serialize};

use crate::error::MockviewError;
use crate::playback::PlaybackEvent;
use crate::turn::{TransitionCause, TurnState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Connecting,
    /// Relay accepted the conversation; the microphone is live.
    Listening,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponsePhase {
    Started,
    Completed,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Device,
    Connection,
    Decode,
    Protocol,
    Timeout,
    /// Reported by the remote agent itself.
    Agent,
    Internal,
}

impl From<&MockviewError> for ErrorKind {
    fn from(e: &MockviewError) -> Self {
        match e {
            MockviewError::DeviceUnavailable(_) => ErrorKind::Device,
            MockviewError::ConnectionUnavailable(_) | MockviewError::Http(_) => ErrorKind::Connection,
            MockviewError::DecodeFailure(_) => ErrorKind::Decode,
            MockviewError::ProtocolAnomaly(_) | MockviewError::Json(_) => ErrorKind::Protocol,
            MockviewError::Timeout(_) => ErrorKind::Timeout,
            _ => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    Status {
        status: SessionStatus,
        detail: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    TurnChanged {
        from: TurnState,
        to: TurnState,
        cause: TransitionCause,
    },
    #[serde(rename_all = "camelCase")]
    UtteranceSent {
        frames: usize,
        duration_ms: u64,
    },
    UtteranceDropped {
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    Transcript {
        text: String,
        is_final: bool,
    },
    AgentResponse {
        phase: ResponsePhase,
        text: String,
    },
    Playback {
        event: PlaybackEvent,
    },
    Notice {
        level: String,
        kind: Option<String>,
        reason: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        kind: ErrorKind,
        message: String,
        user_facing: bool,
    },
    ConversationEnded,
}

impl SessionEvent {
    pub fn from_error(e: &MockviewError) -> Self {
        SessionEvent::Error {
            kind: ErrorKind::from(e),
            message: e.to_string(),
            user_facing: e.is_user_facing(),
        }
    }
}
