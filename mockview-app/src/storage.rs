//! Finished interviews saved as JSON files under the results directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use mockview_core::client::{ChatMessage, Conversation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterviewMode {
    Voice,
    Typed,
}

/// A line heard or spoken during a voice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptLine {
    pub speaker: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewRecord {
    pub id: String,
    pub saved_at: DateTime<Utc>,
    pub session_id: String,
    pub candidate: String,
    pub mode: InterviewMode,
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub transcript: Vec<TranscriptLine>,
}

impl InterviewRecord {
    pub fn new(session_id: &str, candidate: &str, mode: InterviewMode) -> Self {
        Self {
            id: new_id("interview"),
            saved_at: Utc::now(),
            session_id: session_id.into(),
            candidate: candidate.into(),
            mode,
            overall_score: None,
            conversations: Vec::new(),
            messages: Vec::new(),
            transcript: Vec::new(),
        }
    }

    pub fn push_line(&mut self, speaker: &str, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        self.transcript.push(TranscriptLine {
            speaker: speaker.into(),
            text: text.into(),
            at: Utc::now(),
        });
    }
}

/// Write `record` into `dir` and return the file path.
pub fn save_record(dir: &Path, record: &InterviewRecord) -> Result<PathBuf, String> {
    fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    let stamp = record.saved_at.format("%Y%m%d-%H%M%S");
    let session: String = record
        .session_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .take(36)
        .collect();
    let path = dir.join(format!("{stamp}-{session}.json"));
    let json = serde_json::to_string_pretty(record).map_err(|e| e.to_string())?;
    fs::write(&path, json).map_err(|e| e.to_string())?;
    Ok(path)
}

fn new_id(prefix: &str) -> String {
    format!(
        "{prefix}-{}-{:08x}",
        Utc::now().timestamp_micros(),
        rand::random::<u32>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_record_can_be_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = InterviewRecord::new("abc-123", "Ada", InterviewMode::Typed);
        record.overall_score = Some(7.25);
        record.push_line("agent", "Tell me about yourself.");
        record.push_line("candidate", "   ");

        let path = save_record(dir.path(), &record).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().ends_with("-abc-123.json"));
        let loaded: InterviewRecord =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.transcript.len(), 1);
    }

    #[test]
    fn session_ids_cannot_escape_the_results_dir() {
        let dir = tempfile::tempdir().unwrap();
        let record = InterviewRecord::new("../../etc/passwd", "Eve", InterviewMode::Voice);
        let path = save_record(dir.path(), &record).unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
    }
}
