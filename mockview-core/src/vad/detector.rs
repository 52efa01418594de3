//! Speech-turn segmentation on top of a per-frame classifier.
//!
//! ## State per detector
//!
//! ```text
//! idle ──Speech──► in_speech ──N × Silence──► idle
//!  │  (SpeechStart)    │  ▲                   (SpeechEnd | SpeechTooShort)
//!  └─Silence─┘         └──┘ Speech / <N Silence (pause absorbed)
//! ```
//!
//! The voiced span runs from the first speech frame to the last speech frame
//! of a run. Pauses shorter than the hangover count are part of the span;
//! the trailing silence that ends the run is not.

use std::time::Duration;

use tracing::debug;

use super::{VadDecision, VoiceActivityDetector};
use crate::buffering::frame::{duration_to_samples, samples_to_duration, AudioFrame};

/// Tuning for `SpeechDetector`.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Consecutive silent frames that end a speech run.
    /// Default: 6 (≈ 1.5 s with 4096-sample frames at 16 kHz).
    pub hangover_frames: u32,
    /// Shortest voiced span that counts as an utterance. Default: 300 ms.
    pub min_speech: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            hangover_frames: 6,
            min_speech: Duration::from_millis(300),
        }
    }
}

/// Speech-turn boundary events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// First speech frame after silence.
    SpeechStart,
    /// A run ended and its voiced span met the minimum duration.
    SpeechEnd { duration: Duration },
    /// A run ended but was shorter than the minimum; it must be discarded.
    SpeechTooShort { duration: Duration },
}

/// Result of feeding one frame to the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    pub decision: VadDecision,
    pub event: Option<VadEvent>,
    /// Whether the detector is inside a speech run after this frame.
    pub in_speech: bool,
}

pub struct SpeechDetector {
    classifier: Box<dyn VoiceActivityDetector>,
    config: DetectorConfig,
    in_speech: bool,
    silence_run: u32,
    /// Samples from SpeechStart through the most recent speech frame.
    voiced_samples: usize,
    /// Silent samples since the most recent speech frame.
    gap_samples: usize,
}

impl SpeechDetector {
    pub fn new(classifier: Box<dyn VoiceActivityDetector>, config: DetectorConfig) -> Self {
        Self {
            classifier,
            config,
            in_speech: false,
            silence_run: 0,
            voiced_samples: 0,
            gap_samples: 0,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn is_in_speech(&self) -> bool {
        self.in_speech
    }

    pub fn process(&mut self, frame: &AudioFrame) -> FrameOutcome {
        let decision = self.classifier.classify(frame);
        let event = match (self.in_speech, decision) {
            (false, VadDecision::Speech) => {
                self.in_speech = true;
                self.silence_run = 0;
                self.voiced_samples = frame.len();
                self.gap_samples = 0;
                debug!(rms = frame.rms(), "speech start");
                Some(VadEvent::SpeechStart)
            }
            (false, VadDecision::Silence) => None,
            (true, VadDecision::Speech) => {
                self.voiced_samples += self.gap_samples + frame.len();
                self.gap_samples = 0;
                self.silence_run = 0;
                None
            }
            (true, VadDecision::Silence) => {
                self.silence_run += 1;
                self.gap_samples += frame.len();
                if self.silence_run >= self.config.hangover_frames {
                    Some(self.finish_run(frame.sample_rate()))
                } else {
                    None
                }
            }
        };

        FrameOutcome {
            decision,
            event,
            in_speech: self.in_speech,
        }
    }

    /// Drop any in-progress run and reset the classifier.
    pub fn reset(&mut self) {
        self.classifier.reset();
        self.in_speech = false;
        self.silence_run = 0;
        self.voiced_samples = 0;
        self.gap_samples = 0;
    }

    fn finish_run(&mut self, sample_rate: u32) -> VadEvent {
        let duration = samples_to_duration(self.voiced_samples, sample_rate);
        let min_samples = duration_to_samples(self.config.min_speech, sample_rate);
        let event = if self.voiced_samples >= min_samples {
            VadEvent::SpeechEnd { duration }
        } else {
            VadEvent::SpeechTooShort { duration }
        };
        debug!(
            voiced_samples = self.voiced_samples,
            min_samples,
            ?event,
            "speech run finished"
        );
        self.in_speech = false;
        self.silence_run = 0;
        self.voiced_samples = 0;
        self.gap_samples = 0;
        event
    }
}

impl std::fmt::Debug for SpeechDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechDetector")
            .field("config", &self.config)
            .field("in_speech", &self.in_speech)
            .field("silence_run", &self.silence_run)
            .field("voiced_samples", &self.voiced_samples)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::frame::{CAPTURE_SAMPLE_RATE, FRAME_SAMPLES};
    use crate::vad::EnergyVad;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const LOUD: i16 = 3277; // 0.1 RMS
    const QUIET: i16 = 100; // 0.003 RMS

    fn frame(value: i16, len: usize) -> AudioFrame {
        AudioFrame::new(vec![value; len], CAPTURE_SAMPLE_RATE)
    }

    fn detector(hangover_frames: u32) -> SpeechDetector {
        SpeechDetector::new(
            Box::new(EnergyVad::default()),
            DetectorConfig {
                hangover_frames,
                min_speech: Duration::from_millis(300),
            },
        )
    }

    fn events(det: &mut SpeechDetector, frames: &[AudioFrame]) -> Vec<VadEvent> {
        frames.iter().filter_map(|f| det.process(f).event).collect()
    }

    #[test]
    fn all_quiet_frames_never_start_speech() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let mut det = detector(6);
            for _ in 0..40 {
                // Random noise strictly under the 0.015 threshold.
                let amp = rng.gen_range(0..400i16);
                let samples = (0..FRAME_SAMPLES)
                    .map(|i| if i % 2 == 0 { amp } else { -amp })
                    .collect();
                let outcome = det.process(&AudioFrame::new(samples, CAPTURE_SAMPLE_RATE));
                assert_eq!(outcome.event, None);
                assert_eq!(outcome.decision, VadDecision::Silence);
            }
        }
    }

    #[test]
    fn speech_end_fires_after_exactly_hangover_silent_frames() {
        let mut det = detector(6);
        assert_eq!(
            det.process(&frame(LOUD, FRAME_SAMPLES)).event,
            Some(VadEvent::SpeechStart)
        );
        det.process(&frame(LOUD, FRAME_SAMPLES));
        for _ in 0..5 {
            assert_eq!(det.process(&frame(0, FRAME_SAMPLES)).event, None);
        }
        let end = det.process(&frame(0, FRAME_SAMPLES)).event;
        assert_eq!(
            end,
            Some(VadEvent::SpeechEnd {
                duration: Duration::from_millis(512)
            })
        );
        assert!(!det.is_in_speech());
    }

    #[test]
    fn short_pause_is_absorbed_into_the_utterance() {
        let mut det = detector(3);
        let mut seq = vec![frame(LOUD, 1600)];
        seq.extend((0..2).map(|_| frame(0, 1600)));
        seq.push(frame(LOUD, 1600));
        seq.extend((0..3).map(|_| frame(0, 1600)));

        let evs = events(&mut det, &seq);
        // 1600 speech + 3200 pause + 1600 speech = 6400 samples = 400 ms
        assert_eq!(
            evs,
            vec![
                VadEvent::SpeechStart,
                VadEvent::SpeechEnd {
                    duration: Duration::from_millis(400)
                }
            ]
        );
    }

    #[test]
    fn minimum_duration_boundary_is_inclusive() {
        // 480-sample frames = 30 ms each; 10 frames = exactly 300 ms.
        let mut det = detector(2);
        let mut seq: Vec<_> = (0..10).map(|_| frame(LOUD, 480)).collect();
        seq.extend((0..2).map(|_| frame(0, 480)));
        let evs = events(&mut det, &seq);
        assert!(matches!(evs.last(), Some(VadEvent::SpeechEnd { .. })), "{evs:?}");

        let mut det = detector(2);
        let mut seq: Vec<_> = (0..9).map(|_| frame(LOUD, 480)).collect();
        seq.extend((0..2).map(|_| frame(0, 480)));
        let evs = events(&mut det, &seq);
        assert!(
            matches!(evs.last(), Some(VadEvent::SpeechTooShort { .. })),
            "{evs:?}"
        );
    }

    #[test]
    fn single_frame_burst_is_too_short() {
        let mut det = detector(6);
        let mut seq = vec![frame(LOUD, FRAME_SAMPLES)];
        seq.extend((0..6).map(|_| frame(0, FRAME_SAMPLES)));
        let evs = events(&mut det, &seq);
        assert_eq!(
            evs,
            vec![
                VadEvent::SpeechStart,
                VadEvent::SpeechTooShort {
                    duration: Duration::from_millis(256)
                }
            ]
        );
    }

    #[test]
    fn every_run_ends_with_exactly_one_terminal_event() {
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        for _ in 0..200 {
            let hangover = rng.gen_range(1..8u32);
            let mut det = detector(hangover);
            let mut starts = 0usize;
            let mut terminals = 0usize;

            for _ in 0..rng.gen_range(1..60) {
                let value = if rng.gen_bool(0.4) { LOUD } else { QUIET };
                match det.process(&frame(value, 480)).event {
                    Some(VadEvent::SpeechStart) => starts += 1,
                    Some(VadEvent::SpeechEnd { .. }) | Some(VadEvent::SpeechTooShort { .. }) => {
                        terminals += 1
                    }
                    None => {}
                }
                assert!(terminals <= starts);
                assert!(starts - terminals <= 1);
            }

            // Flush with enough silence to close any open run.
            let was_open = det.is_in_speech();
            let mut closing = 0usize;
            for _ in 0..hangover {
                if let Some(ev) = det.process(&frame(0, 480)).event {
                    assert!(!matches!(ev, VadEvent::SpeechStart));
                    closing += 1;
                }
            }
            assert_eq!(closing, usize::from(was_open));
            assert_eq!(starts, terminals + closing);
        }
    }

    #[test]
    fn reset_drops_open_run() {
        let mut det = detector(2);
        det.process(&frame(LOUD, FRAME_SAMPLES));
        assert!(det.is_in_speech());
        det.reset();
        assert!(!det.is_in_speech());
        assert_eq!(det.process(&frame(0, FRAME_SAMPLES)).event, None);
        assert_eq!(det.process(&frame(0, FRAME_SAMPLES)).event, None);
    }
}
