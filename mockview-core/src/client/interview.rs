//! Client for the interview backend's REST endpoints.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use super::provision::{fetch_connection_params, ConnectionParams};
use super::records::{
    InterviewResults, InterviewStatus, ProcessAnswerResponse, StartInterviewResponse,
    TranscriptionResponse, UploadResumeResponse,
};
use super::check_status;
use crate::buffering::utterance::Utterance;
use crate::error::{MockviewError, Result};

/// Resume upload parameters.
#[derive(Debug, Clone)]
pub struct ResumeUpload {
    pub file_name: String,
    pub contents: Vec<u8>,
    pub job_description: String,
    pub max_questions: u32,
    pub ai_voice: String,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| MockviewError::Other(anyhow::anyhow!("invalid API base {base:?}: {e}")))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| MockviewError::Other(anyhow::anyhow!("API base cannot be a base URL")))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        Ok(check_status(response).await?.json().await?)
    }

    pub async fn upload_resume(&self, upload: ResumeUpload) -> Result<UploadResumeResponse> {
        let url = self.endpoint(&["upload-resume"])?;
        let part = Part::bytes(upload.contents)
            .file_name(upload.file_name.clone())
            .mime_str("application/pdf")?;
        let form = Form::new().part("file", part);
        let max_questions = upload.max_questions.to_string();

        info!(file = %upload.file_name, "uploading resume");
        let response = self
            .http
            .post(url)
            .query(&[
                ("job_description", upload.job_description.as_str()),
                ("max_questions", max_questions.as_str()),
                ("ai_voice", upload.ai_voice.as_str()),
            ])
            .multipart(form)
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn start_interview(&self, session_id: &str) -> Result<StartInterviewResponse> {
        let url = self.endpoint(&["start-interview"])?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "session_id": session_id }))
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Upload a WAV recording and return what the backend heard.
    pub async fn transcribe_audio(&self, session_id: &str, wav: Vec<u8>) -> Result<TranscriptionResponse> {
        let url = self.endpoint(&["transcribe-audio"])?;
        debug!(session_id, bytes = wav.len(), "uploading answer audio");
        let part = Part::bytes(wav).file_name("answer.wav").mime_str("audio/wav")?;
        let response = self
            .http
            .post(url)
            .query(&[("session_id", session_id)])
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn transcribe_utterance(
        &self,
        session_id: &str,
        utterance: &Utterance,
    ) -> Result<TranscriptionResponse> {
        self.transcribe_audio(session_id, utterance.to_wav_bytes()?).await
    }

    pub async fn process_answer(
        &self,
        session_id: &str,
        transcript: &str,
        question_index: u32,
    ) -> Result<ProcessAnswerResponse> {
        let url = self.endpoint(&["process-answer"])?;
        let question_index = question_index.to_string();
        debug!(session_id, question_index = %question_index, chars = transcript.len(), "submitting answer");
        let response = self
            .http
            .post(url)
            .query(&[
                ("session_id", session_id),
                ("transcript", transcript),
                ("question_index", question_index.as_str()),
            ])
            .send()
            .await?;
        Self::read_json(response).await
    }

    pub async fn interview_status(&self, session_id: &str) -> Result<InterviewStatus> {
        let url = self.endpoint(&["interview-status", session_id])?;
        Self::read_json(self.http.get(url).send().await?).await
    }

    pub async fn interview_results(&self, session_id: &str) -> Result<InterviewResults> {
        let url = self.endpoint(&["interview-results", session_id])?;
        Self::read_json(self.http.get(url).send().await?).await
    }

    /// Relay credentials for `session_id`. Failures are `ConnectionUnavailable`.
    pub async fn connection_params(&self, session_id: &str) -> Result<ConnectionParams> {
        fetch_connection_params(&self.http, &self.base, session_id).await
    }
}
