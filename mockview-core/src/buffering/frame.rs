//! Immutable PCM frames passed from capture through the VAD to the relay.

use std::sync::Arc;
use std::time::Duration;

/// Capture and relay sample rate (Hz).
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Samples per frame cut by the capture pump (256 ms at 16 kHz).
pub const FRAME_SAMPLES: usize = 4096;

/// A fixed-size block of mono signed 16-bit PCM samples.
///
/// Sample storage is shared, so cloning a frame is cheap and a frame can be
/// held by the utterance buffer and the relay at the same time without copying.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    /// Quantise f32 samples in [-1.0, 1.0] to i16. Out-of-range input is clamped.
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let samples = samples
            .iter()
            .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)
            .collect::<Vec<_>>();
        Self::new(samples, sample_rate)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), self.sample_rate)
    }

    /// Root-mean-square amplitude with samples normalised to [-1, 1].
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self
            .samples
            .iter()
            .map(|&s| {
                let v = s as f64 / 32768.0;
                v * v
            })
            .sum();
        (sum_sq / self.samples.len() as f64).sqrt() as f32
    }

    /// Little-endian s16 encoding, the relay's outbound binary format.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for s in self.samples.iter() {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }
}

pub fn samples_to_duration(samples: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = samples as u128 * 1_000_000_000 / sample_rate as u128;
    Duration::from_nanos(nanos as u64)
}

/// Number of samples covering `duration` at `sample_rate`, rounded to nearest.
pub fn duration_to_samples(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64).round() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rms_of_full_scale_square_wave_is_near_one() {
        let samples = (0..256)
            .map(|i| if i % 2 == 0 { i16::MAX } else { i16::MIN + 1 })
            .collect();
        let frame = AudioFrame::new(samples, CAPTURE_SAMPLE_RATE);
        assert_relative_eq!(frame.rms(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn empty_frame_is_silent_and_zero_length() {
        let frame = AudioFrame::new(vec![], CAPTURE_SAMPLE_RATE);
        assert!(frame.is_empty());
        assert_eq!(frame.rms(), 0.0);
        assert_eq!(frame.duration(), Duration::ZERO);
    }

    #[test]
    fn frame_duration_matches_sample_count() {
        let frame = AudioFrame::new(vec![0; FRAME_SAMPLES], CAPTURE_SAMPLE_RATE);
        assert_eq!(frame.duration(), Duration::from_millis(256));
    }

    #[test]
    fn le_bytes_are_little_endian_pairs() {
        let frame = AudioFrame::new(vec![1, -2, 0x1234], CAPTURE_SAMPLE_RATE);
        assert_eq!(frame.to_le_bytes(), vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
    }

    #[test]
    fn from_f32_clamps_out_of_range_input() {
        let frame = AudioFrame::from_f32(&[2.0, -2.0, 0.0], CAPTURE_SAMPLE_RATE);
        assert_eq!(frame.samples(), &[i16::MAX, -i16::MAX, 0]);
    }

    #[test]
    fn three_tenths_of_a_second_is_4800_samples() {
        assert_eq!(
            duration_to_samples(Duration::from_millis(300), CAPTURE_SAMPLE_RATE),
            4800
        );
    }
}
