//! Response bodies of the interview REST surface.

use serde::{de, Deserialize, Deserializer, Serialize};

/// Scores come back as numbers or numeric strings depending on the model.
fn score<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("score is not numeric: {s:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResumeResponse {
    pub session_id: String,
    pub name: String,
    pub resume_highlights: String,
}

/// Text recognised from an uploaded recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    #[serde(alias = "text")]
    pub transcript: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartInterviewResponse {
    pub message: String,
    pub question_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub feedback: String,
    #[serde(deserialize_with = "score")]
    pub score: f64,
}

/// One graded question/answer pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "Question")]
    pub question: String,
    #[serde(rename = "Candidate Answer")]
    pub answer: String,
    #[serde(rename = "Evaluation", deserialize_with = "score")]
    pub evaluation: f64,
    #[serde(rename = "Feedback")]
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessAnswerResponse {
    pub feedback: Feedback,
    #[serde(default)]
    pub next_question: Option<String>,
    #[serde(default)]
    pub question_index: Option<u32>,
    pub interview_completed: bool,
    #[serde(default)]
    pub thanks_message: Option<String>,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewStatus {
    pub session_id: String,
    pub name: String,
    pub qa_index: u32,
    pub max_questions: u32,
    pub interview_started: bool,
    pub interview_completed: bool,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewResults {
    pub name: String,
    pub overall_score: f64,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_uses_backend_field_names() {
        let c: Conversation = serde_json::from_str(
            r#"{"Question":"Why Rust?","Candidate Answer":"Safety","Evaluation":7.5,"Feedback":"Good"}"#,
        )
        .unwrap();
        assert_eq!(c.answer, "Safety");
        assert_eq!(c.evaluation, 7.5);
    }

    #[test]
    fn score_accepts_numeric_strings() {
        let f: Feedback = serde_json::from_str(r#"{"feedback":"ok","score":" 8 "}"#).unwrap();
        assert_eq!(f.score, 8.0);
        assert!(serde_json::from_str::<Feedback>(r#"{"feedback":"ok","score":"high"}"#).is_err());
    }

    #[test]
    fn final_answer_response_has_no_next_question() {
        let r: ProcessAnswerResponse = serde_json::from_str(
            r#"{"feedback":{"feedback":"fine","score":6},"next_question":null,
                "thanks_message":"Thanks!","interview_completed":true,"overall_score":6.5,
                "conversations":[]}"#,
        )
        .unwrap();
        assert!(r.interview_completed);
        assert_eq!(r.next_question, None);
        assert_eq!(r.overall_score, Some(6.5));
    }
}
