//! Persistent CLI settings (JSON file in the app data directory).
//!
//! Precedence, lowest first: defaults, settings file, `MOCKVIEW_*`
//! environment variables, command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mockview_core::{AudioCodec, SessionConfig};
use serde::{Deserialize, Serialize};

/// Voice the backend falls back to when none is chosen.
pub const DEFAULT_VOICE: &str = "Alex (Male)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub api_base: String,
    pub preferred_input_device: Option<String>,
    pub preferred_output_device: Option<String>,
    pub ai_voice: String,
    pub max_questions: u32,
    pub vad_threshold: f32,
    pub hangover_frames: u32,
    pub min_speech_ms: u64,
    pub response_timeout_ms: u64,
    pub playback_grace_ms: u64,
    pub connect_timeout_ms: u64,
    pub http_timeout_ms: u64,
    pub agent_audio: AudioCodec,
    pub results_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000".into(),
            preferred_input_device: None,
            preferred_output_device: None,
            ai_voice: DEFAULT_VOICE.into(),
            max_questions: 5,
            vad_threshold: 0.015,
            hangover_frames: 6,
            min_speech_ms: 300,
            response_timeout_ms: 10_000,
            playback_grace_ms: 1_000,
            connect_timeout_ms: 10_000,
            http_timeout_ms: 120_000,
            agent_audio: AudioCodec::default(),
            results_dir: None,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.api_base = normalize_api_base(&self.api_base);
        self.preferred_input_device = normalize_device(self.preferred_input_device.as_deref());
        self.preferred_output_device = normalize_device(self.preferred_output_device.as_deref());
        self.ai_voice = normalize_voice(&self.ai_voice);
        self.max_questions = self.max_questions.clamp(1, 20);
        self.vad_threshold = self.vad_threshold.clamp(0.001, 0.5);
        self.hangover_frames = self.hangover_frames.clamp(1, 32);
        self.min_speech_ms = self.min_speech_ms.clamp(50, 5_000);
        self.response_timeout_ms = self.response_timeout_ms.clamp(1_000, 120_000);
        self.playback_grace_ms = self.playback_grace_ms.min(10_000);
        self.connect_timeout_ms = self.connect_timeout_ms.clamp(1_000, 60_000);
        self.http_timeout_ms = self.http_timeout_ms.clamp(1_000, 600_000);
    }

    /// Overlay `MOCKVIEW_*` variables. Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("MOCKVIEW_API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = var("MOCKVIEW_INPUT_DEVICE") {
            self.preferred_input_device = Some(v);
        }
        if let Some(v) = var("MOCKVIEW_OUTPUT_DEVICE") {
            self.preferred_output_device = Some(v);
        }
        if let Some(v) = var("MOCKVIEW_AI_VOICE") {
            self.ai_voice = v;
        }
        if let Some(v) = var("MOCKVIEW_MAX_QUESTIONS").and_then(|v| v.trim().parse().ok()) {
            self.max_questions = v;
        }
        if let Some(v) = var("MOCKVIEW_VAD_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
            self.vad_threshold = v;
        }
        if let Some(v) = var("MOCKVIEW_RESPONSE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            self.response_timeout_ms = v;
        }
        if let Some(v) = var("MOCKVIEW_RESULTS_DIR") {
            self.results_dir = Some(PathBuf::from(v));
        }
        self.normalize();
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default();
        config.vad_threshold = self.vad_threshold;
        config.detector.hangover_frames = self.hangover_frames;
        config.detector.min_speech = Duration::from_millis(self.min_speech_ms);
        config.turn_gate.response_timeout = Duration::from_millis(self.response_timeout_ms);
        config.turn_gate.playback_grace = Duration::from_millis(self.playback_grace_ms);
        config.agent_audio = self.agent_audio;
        config.input_device = self.preferred_input_device.clone();
        config.output_device = self.preferred_output_device.clone();
        config.connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        config
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn results_dir(&self) -> PathBuf {
        self.results_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("results"))
    }
}

fn normalize_api_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        AppSettings::default().api_base
    } else {
        trimmed.into()
    }
}

fn normalize_device(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// Voice names are matched by the backend as given, so only whitespace
/// is touched.
pub fn normalize_voice(raw: &str) -> String {
    match raw.trim() {
        "" => DEFAULT_VOICE.into(),
        voice => voice.into(),
    }
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Mockview")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("mockview")
    }
}

pub fn default_settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults_and_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"apiBase":"https://api.example/ ","maxQuestions":99,"aiVoice":" Female "}"#,
        )
        .unwrap();

        let settings = load_settings(&path);
        assert_eq!(settings.api_base, "https://api.example");
        assert_eq!(settings.max_questions, 20);
        assert_eq!(settings.ai_voice, "Female");
        assert_eq!(settings.hangover_frames, 6);
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_settings(&path), AppSettings::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = AppSettings::default();
        settings.preferred_input_device = Some("USB Headset".into());
        settings.response_timeout_ms = 15_000;
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path), settings);
    }

    #[test]
    fn env_overrides_win_and_bad_numbers_are_ignored() {
        let vars: HashMap<&str, &str> = [
            ("MOCKVIEW_API_BASE", "http://10.0.0.2:8000/"),
            ("MOCKVIEW_MAX_QUESTIONS", "three"),
            ("MOCKVIEW_VAD_THRESHOLD", "0.03"),
            ("MOCKVIEW_INPUT_DEVICE", "  "),
        ]
        .into_iter()
        .collect();
        let mut settings = AppSettings::default();
        settings.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.api_base, "http://10.0.0.2:8000");
        assert_eq!(settings.max_questions, 5);
        assert_eq!(settings.vad_threshold, 0.03);
        assert_eq!(settings.preferred_input_device, None);
    }

    #[test]
    fn voice_names_pass_through_unchanged() {
        assert_eq!(normalize_voice("Alex (Male)"), "Alex (Male)");
        assert_eq!(normalize_voice("  nova "), "nova");
        assert_eq!(normalize_voice("Male"), "Male");
        assert_eq!(normalize_voice("   "), DEFAULT_VOICE);
        assert_eq!(AppSettings::default().ai_voice, "Alex (Male)");
    }

    #[test]
    fn session_config_carries_timings() {
        let mut settings = AppSettings::default();
        settings.response_timeout_ms = 12_000;
        settings.min_speech_ms = 400;
        let config = settings.session_config();
        assert_eq!(config.turn_gate.response_timeout, Duration::from_secs(12));
        assert_eq!(config.detector.min_speech, Duration::from_millis(400));
        assert_eq!(config.vad_threshold, 0.015);
    }
}
