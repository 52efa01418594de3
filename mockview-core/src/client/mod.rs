//! HTTP clients for the interview backend.

pub mod interview;
pub mod provision;
pub mod records;

use reqwest::Response;
use serde::Deserialize;

use crate::error::{MockviewError, Result};

pub use interview::{ApiClient, ResumeUpload};
pub use provision::{fetch_connection_params, ConnectionParams};
pub use records::{
    ChatMessage, Conversation, Feedback, InterviewResults, InterviewStatus,
    ProcessAnswerResponse, StartInterviewResponse, TranscriptionResponse, UploadResumeResponse,
};

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Pass 2xx responses through; turn anything else into `MockviewError::Api`
/// carrying the backend's `detail` text.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        Err(_) => body,
    };
    Err(MockviewError::Api {
        status: status.as_u16(),
        detail,
    })
}
