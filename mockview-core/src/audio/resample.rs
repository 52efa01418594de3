//! Fixed-ratio sample-rate conversion (rubato `FastFixedIn`).
//!
//! Used in both directions: capture audio at the device rate is brought down
//! to the 16 kHz relay rate, and agent audio is brought up to whatever rate
//! the output device runs at. Equal rates skip rubato entirely.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{MockviewError, Result};

/// Mono f32 rate converter that accepts input in arbitrary slice sizes.
pub struct RateConverter {
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
    chunk_size: usize,
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(MockviewError::DeviceUnavailable(format!(
                "cannot resample {from_rate} Hz -> {to_rate} Hz"
            )));
        }
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            to_rate as f64 / from_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            chunk_size,
            1,
        )
        .map_err(|e| MockviewError::DeviceUnavailable(format!("resampler init: {e}")))?;
        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];

        info!(from_rate, to_rate, chunk_size, "resampler enabled");
        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            output_buf,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    /// Convert as much of `samples` (plus any carried-over input) as fills
    /// whole chunks. The remainder waits for the next call or `flush`.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.resampler.is_none() {
            return samples.to_vec();
        }
        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        while self.pending.len() >= self.chunk_size {
            self.convert_chunk(&mut out);
        }
        out
    }

    /// Zero-pad and convert whatever input is still buffered.
    pub fn flush(&mut self) -> Vec<f32> {
        let mut out = Vec::new();
        if self.resampler.is_none() || self.pending.is_empty() {
            return out;
        }
        let real = self.pending.len();
        self.pending.resize(self.chunk_size, 0.0);
        self.convert_chunk(&mut out);
        if let Some(resampler) = &self.resampler {
            // Trim output produced by the padding.
            let keep = (real as f64 * resampler.output_frames_max() as f64
                / self.chunk_size as f64)
                .ceil() as usize;
            out.truncate(keep.min(out.len()));
        }
        out
    }

    fn convert_chunk(&mut self, out: &mut Vec<f32>) {
        let Some(resampler) = self.resampler.as_mut() else {
            return;
        };
        let input = &self.pending[..self.chunk_size];
        match resampler.process_into_buffer(&[input], &mut self.output_buf, None) {
            Ok((_consumed, produced)) => out.extend_from_slice(&self.output_buf[0][..produced]),
            Err(e) => error!("resampler process error: {e}"),
        }
        self.pending.drain(..self.chunk_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_rates_pass_through() {
        let mut rc = RateConverter::new(16_000, 16_000, 1024).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..300).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples), samples);
        assert!(rc.flush().is_empty());
    }

    #[test]
    fn downsample_48k_to_16k_is_a_third() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        let out = rc.process(&vec![0.0f32; 960 * 4]);
        assert!((out.len() as isize - 1280).unsigned_abs() <= 20, "len={}", out.len());
    }

    #[test]
    fn partial_input_is_carried_over() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).unwrap();
        assert!(rc.process(&vec![0.0f32; 500]).is_empty());
        assert!(!rc.process(&vec![0.0f32; 500]).is_empty());
    }

    #[test]
    fn flush_emits_the_tail() {
        let mut rc = RateConverter::new(16_000, 48_000, 1024).unwrap();
        assert!(rc.process(&vec![0.1f32; 100]).is_empty());
        let tail = rc.flush();
        assert!(!tail.is_empty());
        assert!(tail.len() <= 310, "len={}", tail.len());
        assert!(rc.flush().is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(RateConverter::new(0, 16_000, 1024).is_err());
    }
}
