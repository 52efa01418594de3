//! Voice Activity Detection (VAD).
//!
//! Two layers:
//! - a `VoiceActivityDetector` classifies single frames as speech or silence
//!   (`EnergyVad` by default);
//! - a `SpeechDetector` turns that per-frame stream into speech-turn events,
//!   applying silence hysteresis and the minimum utterance duration.

pub mod detector;
pub mod energy;

pub use detector::{DetectorConfig, FrameOutcome, SpeechDetector, VadEvent};
pub use energy::EnergyVad;

use crate::buffering::frame::AudioFrame;

/// Whether a given audio frame contains speech or silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    /// The frame contains speech energy above threshold.
    Speech,
    /// The frame is at or below threshold.
    Silence,
}

impl VadDecision {
    pub fn is_speech(self) -> bool {
        self == VadDecision::Speech
    }
}

/// Per-frame speech classifier.
///
/// Implementors may be stateful (adaptive noise floors, model hidden state).
pub trait VoiceActivityDetector: Send + 'static {
    /// Classify one frame. The frame's sample rate is whatever the capture
    /// pump produces; resampling is the caller's responsibility.
    fn classify(&mut self, frame: &AudioFrame) -> VadDecision;

    /// Reset any internal state.
    fn reset(&mut self);
}
