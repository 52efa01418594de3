//! Capture pump: ring buffer → 16 kHz mono → fixed-size frames.
//!
//! Runs on a blocking thread that also owns the `!Send` cpal stream. The
//! device-open result is reported back through a oneshot before the pump
//! starts draining.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::audio::resample::RateConverter;
use crate::audio::AudioCapture;
use crate::buffering::frame::{AudioFrame, CAPTURE_SAMPLE_RATE};
use crate::buffering::{create_audio_ring, AudioConsumer, Consumer};
use crate::error::{MockviewError, Result};

const DRAIN_CHUNK: usize = 1024;
const SLEEP_EMPTY: Duration = Duration::from_millis(5);
const RESAMPLE_CHUNK: usize = 1024;

/// Cuts a continuous 16 kHz stream into frames of exactly `frame_samples`.
#[derive(Debug)]
pub struct FrameCutter {
    frame_samples: usize,
    pending: Vec<f32>,
}

impl FrameCutter {
    pub fn new(frame_samples: usize) -> Self {
        let frame_samples = frame_samples.max(1);
        Self {
            frame_samples,
            pending: Vec::with_capacity(frame_samples * 2),
        }
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);
        let whole = self.pending.len() / self.frame_samples * self.frame_samples;
        let frames = self.pending[..whole]
            .chunks_exact(self.frame_samples)
            .map(|chunk| AudioFrame::from_f32(chunk, CAPTURE_SAMPLE_RATE))
            .collect();
        self.pending.drain(..whole);
        frames
    }

    /// Samples waiting for a full frame. Discarded on stop.
    pub fn remainder(&self) -> usize {
        self.pending.len()
    }
}

/// Handle to a running capture pump.
#[derive(Debug)]
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
}

impl CaptureHandle {
    /// Ask the pump to stop. The device is released on the pump thread.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("microphone stop requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open the microphone and start pumping frames into `frames`.
///
/// Returns once the device is confirmed open, or with `DeviceUnavailable`.
pub async fn start_capture(
    preferred_device: Option<String>,
    frame_samples: usize,
    frames: mpsc::Sender<AudioFrame>,
) -> Result<CaptureHandle> {
    let (producer, consumer) = create_audio_ring();
    let running = Arc::new(AtomicBool::new(true));
    let (open_tx, open_rx) = oneshot::channel::<Result<u32>>();

    tokio::task::spawn_blocking({
        let running = Arc::clone(&running);
        move || {
            let capture = match AudioCapture::open(
                producer,
                Arc::clone(&running),
                preferred_device.as_deref(),
            ) {
                Ok(c) => {
                    let _ = open_tx.send(Ok(c.sample_rate));
                    c
                }
                Err(e) => {
                    running.store(false, Ordering::SeqCst);
                    let _ = open_tx.send(Err(e));
                    return;
                }
            };

            if let Err(e) = pump(consumer, capture.sample_rate, frame_samples, &running, &frames) {
                warn!(error = %e, "capture pump stopped");
            }
            capture.stop();
            running.store(false, Ordering::SeqCst);
            // Stream drops here, releasing the device on this thread.
            drop(capture);
        }
    });

    match open_rx.await {
        Ok(Ok(rate)) => {
            info!(device_rate = rate, "microphone open");
            Ok(CaptureHandle { running })
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(MockviewError::DeviceUnavailable(
            "capture thread exited before opening the device".into(),
        )),
    }
}

fn pump(
    mut consumer: AudioConsumer,
    device_rate: u32,
    frame_samples: usize,
    running: &AtomicBool,
    frames: &mpsc::Sender<AudioFrame>,
) -> Result<()> {
    let mut converter = RateConverter::new(device_rate, CAPTURE_SAMPLE_RATE, RESAMPLE_CHUNK)?;
    let mut cutter = FrameCutter::new(frame_samples);
    let mut scratch = vec![0.0f32; DRAIN_CHUNK];
    let mut sent = 0usize;

    while running.load(Ordering::SeqCst) {
        let n = consumer.pop_slice(&mut scratch);
        if n == 0 {
            std::thread::sleep(SLEEP_EMPTY);
            continue;
        }
        let resampled = converter.process(&scratch[..n]);
        for frame in cutter.push(&resampled) {
            if frames.blocking_send(frame).is_err() {
                debug!("frame receiver dropped; stopping capture");
                return Ok(());
            }
            sent += 1;
        }
    }
    debug!(sent, discarded = cutter.remainder(), "capture pump finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cutter_emits_only_whole_frames() {
        let mut cutter = FrameCutter::new(4);
        assert!(cutter.push(&[0.1; 3]).is_empty());
        let frames = cutter.push(&[0.1; 6]);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 4 && f.sample_rate() == CAPTURE_SAMPLE_RATE));
        assert_eq!(cutter.remainder(), 1);
    }

    #[test]
    fn cutter_preserves_sample_order() {
        let mut cutter = FrameCutter::new(2);
        let frames = cutter.push(&[0.0, 0.5, -0.5, 0.25]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples()[0], 0);
        assert!(frames[0].samples()[1] > 0);
        assert!(frames[1].samples()[0] < 0);
    }
}
