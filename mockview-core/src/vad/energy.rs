//! Energy-based classifier: a frame is speech when its normalised RMS
//! amplitude exceeds a fixed threshold.
//!
//! Hysteresis lives one level up in `SpeechDetector`, which counts
//! consecutive silent frames before ending a speech run.

use super::{VadDecision, VoiceActivityDetector};
use crate::buffering::frame::AudioFrame;

/// Default RMS threshold, tuned for a laptop microphone with device-level
/// echo cancellation enabled.
pub const DEFAULT_RMS_THRESHOLD: f32 = 0.015;

/// A stateless RMS threshold classifier.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    /// Frames with RMS strictly above this are speech.
    /// Typical range: 0.01–0.05.
    threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(DEFAULT_RMS_THRESHOLD)
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify(&mut self, frame: &AudioFrame) -> VadDecision {
        if frame.rms() > self.threshold {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::frame::CAPTURE_SAMPLE_RATE;

    fn constant_frame(value: i16, len: usize) -> AudioFrame {
        AudioFrame::new(vec![value; len], CAPTURE_SAMPLE_RATE)
    }

    #[test]
    fn silence_below_threshold() {
        let mut vad = EnergyVad::default();
        assert_eq!(vad.classify(&constant_frame(0, 160)), VadDecision::Silence);
    }

    #[test]
    fn speech_above_threshold() {
        let mut vad = EnergyVad::default();
        // 0.1 of full scale
        assert_eq!(vad.classify(&constant_frame(3277, 160)), VadDecision::Speech);
    }

    #[test]
    fn threshold_is_exclusive() {
        // A constant 16384 frame has RMS exactly 0.5.
        let mut vad = EnergyVad::new(0.5);
        assert_eq!(vad.classify(&constant_frame(16384, 64)), VadDecision::Silence);
        assert_eq!(vad.classify(&constant_frame(16385, 64)), VadDecision::Speech);
    }

    #[test]
    fn empty_frame_is_silence() {
        let mut vad = EnergyVad::default();
        let frame = AudioFrame::new(vec![], CAPTURE_SAMPLE_RATE);
        assert_eq!(vad.classify(&frame), VadDecision::Silence);
    }

    #[test]
    fn quiet_room_noise_stays_silent() {
        // ~0.006 RMS, typical fan hum after AGC.
        let samples = (0..4096)
            .map(|i| if i % 2 == 0 { 200 } else { -200 })
            .collect();
        let mut vad = EnergyVad::default();
        assert_eq!(
            vad.classify(&AudioFrame::new(samples, CAPTURE_SAMPLE_RATE)),
            VadDecision::Silence
        );
    }
}
