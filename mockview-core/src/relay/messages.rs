//! JSON control messages exchanged with the conversational agent.
//!
//! Both directions are tagged on the `message` field. Inbound messages with
//! a tag we do not model deserialize to `ServerMessage::Unknown`; anything
//! that fails to parse is a protocol anomaly.

use serde::{Deserialize, Serialize};

use crate::buffering::frame::CAPTURE_SAMPLE_RATE;
use crate::error::{MockviewError, Result};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TranscriptMetadata {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub end_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "message")]
pub enum ServerMessage {
    ConversationStarted {
        #[serde(default)]
        id: Option<String>,
    },
    AddPartialTranscript {
        #[serde(default)]
        metadata: TranscriptMetadata,
    },
    AddTranscript {
        #[serde(default)]
        metadata: TranscriptMetadata,
    },
    ResponseStarted {
        #[serde(default)]
        content: String,
    },
    ResponseCompleted {
        #[serde(default)]
        content: String,
    },
    ResponseInterrupted {
        #[serde(default)]
        content: String,
    },
    AudioAdded {
        seq_no: u64,
    },
    Info {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    Warning {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    Error {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    ConversationEnded,
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Parse one inbound text frame. Malformed payloads map to
    /// `ProtocolAnomaly`.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| MockviewError::ProtocolAnomaly(format!("{e}: {text}")))
    }

    /// The `message` tag, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::ConversationStarted { .. } => "ConversationStarted",
            ServerMessage::AddPartialTranscript { .. } => "AddPartialTranscript",
            ServerMessage::AddTranscript { .. } => "AddTranscript",
            ServerMessage::ResponseStarted { .. } => "ResponseStarted",
            ServerMessage::ResponseCompleted { .. } => "ResponseCompleted",
            ServerMessage::ResponseInterrupted { .. } => "ResponseInterrupted",
            ServerMessage::AudioAdded { .. } => "AudioAdded",
            ServerMessage::Info { .. } => "Info",
            ServerMessage::Warning { .. } => "Warning",
            ServerMessage::Error { .. } => "Error",
            ServerMessage::ConversationEnded => "ConversationEnded",
            ServerMessage::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioFormat {
    #[serde(rename = "type")]
    pub kind: String,
    pub encoding: String,
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            kind: "raw".into(),
            encoding: "pcm_s16le".into(),
            sample_rate: CAPTURE_SAMPLE_RATE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationConfig {
    pub template_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "message")]
pub enum ClientMessage {
    StartConversation {
        audio_format: AudioFormat,
        conversation_config: ConversationConfig,
    },
    /// Marks the end of one candidate utterance.
    EndOfUtterance { last_seq_no: u64 },
    /// No more audio will follow on this connection.
    AudioEnded { last_seq_no: u64 },
}

impl ClientMessage {
    pub fn start_conversation(template_id: impl Into<String>) -> Self {
        ClientMessage::StartConversation {
            audio_format: AudioFormat::default(),
            conversation_config: ConversationConfig {
                template_id: template_id.into(),
            },
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_transcript_with_metadata() {
        let msg = ServerMessage::parse(
            r#"{"message":"AddTranscript","metadata":{"transcript":"I led the migration","start_time":1.2,"end_time":2.5},"results":[]}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::AddTranscript { metadata } => {
                assert_eq!(metadata.transcript, "I led the migration");
                assert_eq!(metadata.end_time, Some(2.5));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_tag_maps_to_unknown() {
        let msg = ServerMessage::parse(r#"{"message":"ToolInvoke","id":"x"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn conversation_ended_ignores_extra_fields() {
        let msg = ServerMessage::parse(r#"{"message":"ConversationEnded","reason":"done"}"#).unwrap();
        assert_eq!(msg, ServerMessage::ConversationEnded);
    }

    #[test]
    fn malformed_payloads_are_protocol_anomalies() {
        for bad in [
            "not json",
            r#"{"no_tag":true}"#,
            r#"{"message":"AudioAdded"}"#,
            r#"{"message":"AudioAdded","seq_no":"seven"}"#,
        ] {
            let err = ServerMessage::parse(bad).unwrap_err();
            assert!(matches!(err, MockviewError::ProtocolAnomaly(_)), "{bad}: {err:?}");
        }
    }

    #[test]
    fn start_conversation_wire_shape() {
        let value: serde_json::Value =
            serde_json::from_str(&ClientMessage::start_conversation("tmpl:latest").to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "message": "StartConversation",
                "audio_format": {"type": "raw", "encoding": "pcm_s16le", "sample_rate": 16000},
                "conversation_config": {"template_id": "tmpl:latest"}
            })
        );
    }

    #[test]
    fn end_of_utterance_carries_sequence_number() {
        let json = ClientMessage::EndOfUtterance { last_seq_no: 12 }.to_json().unwrap();
        assert_eq!(json, r#"{"message":"EndOfUtterance","last_seq_no":12}"#);
    }
}
