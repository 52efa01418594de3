//! `mockview` command-line host.
//!
//! Loads settings, configures logging, and runs either a live voice
//! interview or a typed one against the interview backend.

mod commands;
mod settings;
mod storage;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use commands::SessionSource;
use settings::{default_settings_path, load_settings, save_settings, AppSettings};

#[derive(Parser, Debug)]
#[command(author, version, about = "Practice job interviews by voice or text", long_about = None)]
struct Cli {
    /// Settings file. Defaults to the platform data directory.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Interview backend base URL.
    #[arg(long, global = true)]
    api: Option<String>,

    /// Persist the effective settings after applying flags.
    #[arg(long, global = true)]
    save_settings: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Live spoken interview.
    Voice {
        #[command(flatten)]
        session: SessionArgs,
        /// Microphone name (see `devices`).
        #[arg(long)]
        input_device: Option<String>,
        /// Speaker name (see `devices`).
        #[arg(long)]
        output_device: Option<String>,
    },
    /// Answer questions by typing.
    Typed {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// List audio devices.
    Devices,
}

#[derive(Args, Debug)]
struct SessionArgs {
    /// Resume PDF to upload.
    #[arg(long, required_unless_present = "session")]
    resume: Option<PathBuf>,
    /// Job description text, or `@file` to read it from a file.
    #[arg(long, required_unless_present = "session")]
    job: Option<String>,
    /// Resume an existing backend session instead of uploading.
    #[arg(long, conflicts_with_all = ["resume", "job"])]
    session: Option<String>,
    #[arg(long)]
    max_questions: Option<u32>,
    /// Interviewer voice as the backend names it, e.g. "Alex (Male)" or "nova".
    #[arg(long)]
    voice: Option<String>,
}

impl SessionArgs {
    fn apply(&self, settings: &mut AppSettings) {
        if let Some(n) = self.max_questions {
            settings.max_questions = n;
        }
        if let Some(v) = self.voice.as_deref() {
            settings.ai_voice = v.to_string();
        }
    }

    fn source(&self) -> Result<SessionSource> {
        if let Some(session_id) = self.session.clone() {
            return Ok(SessionSource::Existing { session_id });
        }
        let path = self.resume.clone().context("--resume is required")?;
        let job = self.job.as_deref().context("--job is required")?;
        Ok(SessionSource::Resume {
            path,
            job_description: commands::read_job_description(job)?,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    settings.apply_env_overrides();
    if let Some(api) = cli.api.as_deref() {
        settings.api_base = api.to_string();
    }
    match &cli.command {
        Command::Voice {
            session,
            input_device,
            output_device,
        } => {
            session.apply(&mut settings);
            if input_device.is_some() {
                settings.preferred_input_device = input_device.clone();
            }
            if output_device.is_some() {
                settings.preferred_output_device = output_device.clone();
            }
        }
        Command::Typed { session } => session.apply(&mut settings),
        Command::Devices => {}
    }
    settings.normalize();
    info!(api = %settings.api_base, settings = %settings_path.display(), "settings loaded");

    if cli.save_settings {
        save_settings(&settings_path, &settings)
            .with_context(|| format!("saving {}", settings_path.display()))?;
    }

    match cli.command {
        Command::Devices => commands::print_devices(),
        Command::Typed { session } => {
            commands::run_typed(&settings, session.source()?).await?;
        }
        Command::Voice { session, .. } => {
            commands::run_voice(&settings, session.source()?).await?;
        }
    }
    Ok(())
}
