//! Utterance accumulation between speech-start and speech-end.

use std::io::Cursor;
use std::time::Duration;

use tracing::debug;

use super::frame::{samples_to_duration, AudioFrame};
use crate::error::{MockviewError, Result};
use crate::vad::{FrameOutcome, VadDecision, VadEvent};

/// An ordered run of frames from speech start to the last speech frame.
#[derive(Debug, Clone)]
pub struct Utterance {
    frames: Vec<AudioFrame>,
}

impl Utterance {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    pub fn sample_count(&self) -> usize {
        self.frames.iter().map(AudioFrame::len).sum()
    }

    pub fn sample_rate(&self) -> u32 {
        self.frames.first().map(AudioFrame::sample_rate).unwrap_or(0)
    }

    pub fn duration(&self) -> Duration {
        samples_to_duration(self.sample_count(), self.sample_rate())
    }

    /// Encode as a mono 16-bit WAV file, the format the transcription
    /// endpoint accepts.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate(),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| MockviewError::Other(anyhow::anyhow!("wav writer: {e}")))?;
            for frame in &self.frames {
                for &s in frame.samples() {
                    writer
                        .write_sample(s)
                        .map_err(|e| MockviewError::Other(anyhow::anyhow!("wav write: {e}")))?;
                }
            }
            writer
                .finalize()
                .map_err(|e| MockviewError::Other(anyhow::anyhow!("wav finalize: {e}")))?;
        }
        Ok(cursor.into_inner())
    }
}

/// Accumulates frames for at most one in-flight utterance.
///
/// Silence inside a speech run is held back as a pending gap and only
/// committed if speech resumes, so the trailing hysteresis silence never
/// reaches the relay.
#[derive(Debug, Default)]
pub struct UtteranceBuffer {
    frames: Vec<AudioFrame>,
    gap: Vec<AudioFrame>,
    active: bool,
}

impl UtteranceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn buffered_samples(&self) -> usize {
        self.frames.iter().map(AudioFrame::len).sum()
    }

    /// Apply one detector outcome for `frame`. Returns the completed
    /// utterance when the outcome carries `SpeechEnd`.
    pub fn accept(&mut self, frame: &AudioFrame, outcome: &FrameOutcome) -> Option<Utterance> {
        match outcome.event {
            Some(VadEvent::SpeechStart) => {
                self.clear();
                self.active = true;
                self.frames.push(frame.clone());
                None
            }
            Some(VadEvent::SpeechEnd { duration }) => {
                let utterance = Utterance::new(std::mem::take(&mut self.frames));
                debug!(
                    frames = utterance.frames().len(),
                    ?duration,
                    "utterance complete"
                );
                self.clear();
                Some(utterance)
            }
            Some(VadEvent::SpeechTooShort { duration }) => {
                debug!(?duration, "discarding short utterance");
                self.clear();
                None
            }
            None if !self.active => None,
            None => {
                match outcome.decision {
                    VadDecision::Speech => {
                        self.frames.append(&mut self.gap);
                        self.frames.push(frame.clone());
                    }
                    VadDecision::Silence => self.gap.push(frame.clone()),
                }
                None
            }
        }
    }

    /// Drop everything, including an in-flight utterance.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.gap.clear();
        self.active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::frame::CAPTURE_SAMPLE_RATE;
    use crate::vad::{DetectorConfig, EnergyVad, SpeechDetector};

    fn frame(value: i16) -> AudioFrame {
        AudioFrame::new(vec![value; 1600], CAPTURE_SAMPLE_RATE)
    }

    fn run(values: &[i16], hangover: u32) -> Vec<Utterance> {
        let mut det = SpeechDetector::new(
            Box::new(EnergyVad::default()),
            DetectorConfig {
                hangover_frames: hangover,
                min_speech: Duration::from_millis(300),
            },
        );
        let mut buf = UtteranceBuffer::new();
        let mut out = Vec::new();
        for &v in values {
            let f = frame(v);
            let outcome = det.process(&f);
            if let Some(u) = buf.accept(&f, &outcome) {
                out.push(u);
            }
        }
        out
    }

    #[test]
    fn trailing_silence_is_not_included() {
        let out = run(&[5000, 5000, 5000, 0, 0, 0], 3);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frames().len(), 3);
        assert_eq!(out[0].duration(), Duration::from_millis(300));
    }

    #[test]
    fn inner_pause_is_kept_in_order() {
        let out = run(&[5000, 0, 7000, 0, 0], 2);
        assert_eq!(out.len(), 1);
        let firsts: Vec<i16> = out[0].frames().iter().map(|f| f.samples()[0]).collect();
        assert_eq!(firsts, vec![5000, 0, 7000]);
    }

    #[test]
    fn too_short_run_is_dropped_and_buffer_emptied() {
        let out = run(&[5000, 0, 0], 2);
        assert!(out.is_empty());
    }

    #[test]
    fn buffer_resets_between_utterances() {
        let out = run(&[5000, 5000, 0, 0, 6000, 6000, 6000, 0, 0], 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].frames().len(), 2);
        assert_eq!(out[1].frames().len(), 3);
        assert!(out[1].frames().iter().all(|f| f.samples()[0] == 6000));
    }

    #[test]
    fn wav_encoding_round_trips_through_hound() {
        let utt = Utterance::new(vec![frame(1234), frame(-1234)]);
        let bytes = utt.to_wav_bytes().expect("encode wav");
        let reader = hound::WavReader::new(Cursor::new(bytes)).expect("parse wav");
        assert_eq!(reader.spec().sample_rate, CAPTURE_SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 3200);
    }
}
