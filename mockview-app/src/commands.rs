//! The interview flows behind each CLI subcommand.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use mockview_core::audio::device::{list_devices, DeviceDirection};
use mockview_core::events::ResponsePhase;
use mockview_core::{
    ApiClient, ErrorKind, ResumeUpload, SessionEvent, SessionStatus, VoiceSession,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::settings::AppSettings;
use crate::storage::{save_record, InterviewMode, InterviewRecord};

/// The backend scores the first answer against this when no question has
/// been asked yet.
const OPENING_QUESTION: &str = "Tell me about yourself and your experience.";

/// Where the interview session comes from.
#[derive(Debug, Clone)]
pub enum SessionSource {
    Resume { path: PathBuf, job_description: String },
    Existing { session_id: String },
}

/// Print capture and output devices, marking the recommended microphone.
pub fn print_devices() {
    let devices = list_devices();
    if devices.is_empty() {
        println!("no audio devices found");
        return;
    }
    for d in devices {
        let direction = match d.direction {
            DeviceDirection::Input => "in ",
            DeviceDirection::Output => "out",
        };
        let mut tags = Vec::new();
        if d.is_default {
            tags.push("default");
        }
        if d.is_recommended {
            tags.push("recommended");
        }
        if d.is_loopback_like {
            tags.push("loopback");
        }
        if tags.is_empty() {
            println!("{direction}  {}", d.name);
        } else {
            println!("{direction}  {}  [{}]", d.name, tags.join(", "));
        }
    }
}

/// Accepts inline text or `@path` to read the description from a file.
pub fn read_job_description(raw: &str) -> Result<String> {
    match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading job description from {path}")),
        None => Ok(raw.to_string()),
    }
}

async fn open_session(
    api: &ApiClient,
    settings: &AppSettings,
    source: &SessionSource,
) -> Result<(String, String)> {
    match source {
        SessionSource::Existing { session_id } => {
            let status = api
                .interview_status(session_id)
                .await
                .with_context(|| format!("looking up session {session_id}"))?;
            Ok((status.session_id, status.name))
        }
        SessionSource::Resume {
            path,
            job_description,
        } => {
            let upload = resume_upload(path, job_description, settings)?;
            let uploaded = api.upload_resume(upload).await.context("uploading resume")?;
            println!("Hello {}! Resume highlights:\n{}\n", uploaded.name, uploaded.resume_highlights);
            Ok((uploaded.session_id, uploaded.name))
        }
    }
}

fn resume_upload(path: &Path, job_description: &str, settings: &AppSettings) -> Result<ResumeUpload> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if !is_pdf {
        bail!("resume must be a PDF: {}", path.display());
    }
    if job_description.trim().is_empty() {
        bail!("a job description is required");
    }
    let contents = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "resume.pdf".into());
    Ok(ResumeUpload {
        file_name,
        contents,
        job_description: job_description.to_string(),
        max_questions: settings.max_questions,
        ai_voice: settings.ai_voice.clone(),
    })
}

/// Question-by-question interview answered on stdin.
pub async fn run_typed(settings: &AppSettings, source: SessionSource) -> Result<PathBuf> {
    let api = ApiClient::new(&settings.api_base, settings.http_timeout())?;
    let (session_id, name) = open_session(&api, settings, &source).await?;
    let started = api
        .start_interview(&session_id)
        .await
        .context("starting interview")?;

    println!("{}", started.message);
    let mut question = OPENING_QUESTION.to_string();
    let mut index = started.question_index;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        println!("\n{}", question_prompt(index, &question));
        println!("(answer on one line; an empty line skips)");
        let Some(answer) = lines.next_line().await.context("reading answer")? else {
            bail!("stdin closed before the interview finished");
        };

        let reply = api
            .process_answer(&session_id, answer.trim(), index)
            .await
            .context("submitting answer")?;
        println!("Feedback ({:.1}/10): {}", reply.feedback.score, reply.feedback.feedback);

        if reply.interview_completed {
            if let Some(thanks) = reply.thanks_message.as_deref() {
                println!("\n{thanks}");
            }
            break;
        }
        match (reply.next_question, reply.question_index) {
            (Some(next), Some(next_index)) => {
                question = next;
                index = next_index;
            }
            _ => bail!("backend returned neither a next question nor completion"),
        }
    }

    let results = api
        .interview_results(&session_id)
        .await
        .context("fetching results")?;
    println!("\nOverall score: {:.1}", results.overall_score);

    let mut record = InterviewRecord::new(&session_id, &name, InterviewMode::Typed);
    record.overall_score = Some(results.overall_score);
    record.conversations = results.conversations;
    record.messages = results.messages;
    save(settings, &record)
}

/// The backend numbers questions from 1.
fn question_prompt(index: u32, question: &str) -> String {
    format!("Q{index}: {question}")
}

/// Live spoken interview with the relay agent.
///
/// Each answer the relay transcribes is submitted for scoring when the
/// agent starts its next turn.
pub async fn run_voice(settings: &AppSettings, source: SessionSource) -> Result<PathBuf> {
    let api = ApiClient::new(&settings.api_base, settings.http_timeout())?;
    let (session_id, name) = open_session(&api, settings, &source).await?;
    let started = api
        .start_interview(&session_id)
        .await
        .context("starting interview")?;
    let params = api
        .connection_params(&session_id)
        .await
        .context("fetching relay credentials")?;

    let mut session = VoiceSession::connect(&params, settings.session_config())
        .await
        .context("starting voice session")?;
    let mut events = session.subscribe();
    let mut record = InterviewRecord::new(&session_id, &name, InterviewMode::Voice);
    let mut collector = AnswerCollector::default();
    let (answers, answers_rx) = mpsc::unbounded_channel();
    let scorer = tokio::spawn(score_answers(
        api.clone(),
        session_id.clone(),
        started.question_index,
        answers_rx,
    ));
    println!("Connecting... speak when you hear the interviewer. Ctrl+C ends the interview.");

    let outcome: Result<()> = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; ending interview");
                break Ok(());
            }
            ev = events.recv() => match ev {
                Ok(SessionEvent::ConversationEnded) => break Ok(()),
                Ok(ev) => {
                    if let Some(err) = render_event(&ev, &mut record) {
                        break Err(err);
                    }
                    if let Some(answer) = collector.observe(&ev) {
                        let _ = answers.send(answer);
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event consumer lagged"),
                Err(RecvError::Closed) => break Ok(()),
            }
        }
    };

    session.close().await?;
    println!("\nInterview over. Session diagnostics: {:?}", session.diagnostics());

    if let Some(answer) = collector.take() {
        let _ = answers.send(answer);
    }
    drop(answers);
    let scored = scorer.await.unwrap_or_else(|e| {
        warn!(error = %e, "answer scoring task failed");
        ScoreOutcome::default()
    });
    info!(answered = scored.answered, completed = scored.completed, "voice answers scored");

    if scored.completed {
        match api.interview_results(&session_id).await {
            Ok(results) => {
                println!("Overall score: {:.1}", results.overall_score);
                record.overall_score = Some(results.overall_score);
                record.conversations = results.conversations;
                record.messages = results.messages;
            }
            Err(e) => warn!(error = %e, "could not fetch interview results"),
        }
    } else {
        match api.interview_status(&session_id).await {
            Ok(status) => {
                record.messages = status.messages;
                record.conversations = status.conversations;
            }
            Err(e) => warn!(error = %e, "could not fetch final interview status"),
        }
    }
    let saved = save(settings, &record)?;
    outcome.map(|_| saved)
}

/// Candidate speech heard since the last submitted answer.
#[derive(Debug, Default)]
struct AnswerCollector {
    parts: Vec<String>,
}

impl AnswerCollector {
    /// Returns the finished answer once the agent begins replying to it.
    fn observe(&mut self, ev: &SessionEvent) -> Option<String> {
        match ev {
            SessionEvent::Transcript {
                text,
                is_final: true,
            } => {
                let text = text.trim();
                if !text.is_empty() {
                    self.parts.push(text.to_string());
                }
                None
            }
            SessionEvent::AgentResponse {
                phase: ResponsePhase::Started,
                ..
            } => self.take(),
            _ => None,
        }
    }

    fn take(&mut self) -> Option<String> {
        if self.parts.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.parts).join(" "))
    }
}

#[derive(Debug, Default)]
struct ScoreOutcome {
    answered: u32,
    completed: bool,
}

/// Submit answers in order until the channel closes.
async fn score_answers(
    api: ApiClient,
    session_id: String,
    mut index: u32,
    mut answers: mpsc::UnboundedReceiver<String>,
) -> ScoreOutcome {
    let mut outcome = ScoreOutcome::default();
    while let Some(answer) = answers.recv().await {
        if outcome.completed {
            info!(chars = answer.len(), "interview already scored; answer not submitted");
            continue;
        }
        match api.process_answer(&session_id, &answer, index).await {
            Ok(reply) => {
                outcome.answered += 1;
                println!(
                    "[feedback {:.1}/10] {}",
                    reply.feedback.score, reply.feedback.feedback
                );
                if reply.interview_completed {
                    outcome.completed = true;
                    if let Some(thanks) = reply.thanks_message.as_deref() {
                        println!("{thanks}");
                    }
                } else if let Some(next) = reply.question_index {
                    index = next;
                }
            }
            Err(e) => warn!(error = %e, question_index = index, "could not score answer"),
        }
    }
    outcome
}

/// Print one session event. Returns an error for conditions that end the
/// interview.
fn render_event(ev: &SessionEvent, record: &mut InterviewRecord) -> Option<anyhow::Error> {
    match ev {
        SessionEvent::Status {
            status: SessionStatus::Listening,
            ..
        } => println!("[connected] listening"),
        SessionEvent::Transcript {
            text,
            is_final: true,
        } => {
            println!("you: {text}");
            record.push_line("candidate", text);
        }
        SessionEvent::AgentResponse {
            phase: ResponsePhase::Completed | ResponsePhase::Interrupted,
            text,
        } if !text.trim().is_empty() => {
            println!("interviewer: {text}");
            record.push_line("interviewer", text);
        }
        SessionEvent::UtteranceDropped { reason } => println!("[not sent: {reason}]"),
        SessionEvent::Error {
            kind,
            message,
            user_facing: true,
        } => {
            eprintln!("error: {message}");
            if matches!(kind, ErrorKind::Connection | ErrorKind::Device) {
                return Some(anyhow::anyhow!("{message}"));
            }
        }
        _ => {}
    }
    None
}

fn save(settings: &AppSettings, record: &InterviewRecord) -> Result<PathBuf> {
    let path = save_record(&settings.results_dir(), record).map_err(anyhow::Error::msg)?;
    println!("Saved results to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_description_can_come_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.txt");
        std::fs::write(&path, "Rust backend engineer").unwrap();
        let raw = format!("@{}", path.display());
        assert_eq!(read_job_description(&raw).unwrap(), "Rust backend engineer");
        assert_eq!(read_job_description("inline").unwrap(), "inline");
    }

    #[test]
    fn resume_must_be_a_pdf_with_a_job() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("cv.txt");
        std::fs::write(&txt, "x").unwrap();
        let settings = AppSettings::default();
        assert!(resume_upload(&txt, "job", &settings).is_err());

        let pdf = dir.path().join("cv.PDF");
        std::fs::write(&pdf, "%PDF").unwrap();
        assert!(resume_upload(&pdf, "  ", &settings).is_err());
        let upload = resume_upload(&pdf, "job", &settings).unwrap();
        assert_eq!(upload.file_name, "cv.PDF");
        assert_eq!(upload.max_questions, settings.max_questions);
    }

    #[test]
    fn first_prompt_is_the_opening_question() {
        let started: mockview_core::client::StartInterviewResponse = serde_json::from_str(
            r#"{"message":"Interview started. Connecting to agent...","question_index":1}"#,
        )
        .unwrap();
        assert_eq!(
            question_prompt(started.question_index, OPENING_QUESTION),
            "Q1: Tell me about yourself and your experience."
        );
        assert_eq!(question_prompt(2, "Why Rust?"), "Q2: Why Rust?");
    }

    #[test]
    fn answers_are_released_when_the_agent_replies() {
        let mut collector = AnswerCollector::default();
        let heard = |text: &str, is_final| SessionEvent::Transcript {
            text: text.into(),
            is_final,
        };
        let reply = SessionEvent::AgentResponse {
            phase: ResponsePhase::Started,
            text: "Thanks. Next question.".into(),
        };

        assert_eq!(collector.observe(&reply), None);
        assert_eq!(collector.observe(&heard("I led", false)), None);
        assert_eq!(collector.observe(&heard("I led a team", true)), None);
        assert_eq!(collector.observe(&heard("  of five. ", true)), None);
        assert_eq!(collector.observe(&reply).as_deref(), Some("I led a team of five."));
        assert_eq!(collector.take(), None);
    }

    #[tokio::test]
    async fn spoken_answers_are_scored_in_order() {
        use wiremock::matchers::{method, path, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/process-answer"))
            .and(query_param("question_index", "1"))
            .and(query_param("transcript", "first answer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "feedback": { "feedback": "ok", "score": 6 },
                "next_question": "Why Rust?",
                "question_index": 2,
                "interview_completed": false
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/process-answer"))
            .and(query_param("question_index", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "feedback": { "feedback": "great", "score": 9 },
                "thanks_message": "Thanks!",
                "interview_completed": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiClient::new(&server.uri(), std::time::Duration::from_secs(5)).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        for answer in ["first answer", "second answer", "after the end"] {
            tx.send(answer.to_string()).unwrap();
        }
        drop(tx);

        let outcome = score_answers(api, "s-1".into(), 1, rx).await;
        assert_eq!(outcome.answered, 2);
        assert!(outcome.completed);
    }

    #[test]
    fn connection_errors_end_the_interview() {
        let mut record = InterviewRecord::new("s", "n", InterviewMode::Voice);
        let fatal = SessionEvent::Error {
            kind: ErrorKind::Connection,
            message: "gone".into(),
            user_facing: true,
        };
        assert!(render_event(&fatal, &mut record).is_some());

        let agent = SessionEvent::Error {
            kind: ErrorKind::Agent,
            message: "quota".into(),
            user_facing: true,
        };
        assert!(render_event(&agent, &mut record).is_none());

        let heard = SessionEvent::Transcript {
            text: "I like Rust".into(),
            is_final: true,
        };
        render_event(&heard, &mut record);
        assert_eq!(record.transcript.len(), 1);
    }
}
