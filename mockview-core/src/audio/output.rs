//! cpal speaker output for agent audio.
//!
//! A stream is built per segment on the playback worker thread, which keeps
//! the `!Send` stream on one thread and picks up device changes between
//! segments. The callback only reads from a shared slice and bumps an
//! atomic cursor.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use tracing::{debug, error, warn};

use super::resample::RateConverter;
use crate::error::{MockviewError, Result};
use crate::playback::{AudioSink, DecodedAudio};

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Extra wait past the nominal length before giving up on a stalled device.
const STALL_MARGIN: Duration = Duration::from_millis(750);

#[derive(Debug, Clone, Default)]
pub struct CpalSink {
    preferred_device: Option<String>,
}

impl CpalSink {
    pub fn new(preferred_device: Option<String>) -> Self {
        Self { preferred_device }
    }

    fn device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        if let Some(name) = self.preferred_device.as_deref() {
            if let Ok(mut devices) = host.output_devices() {
                if let Some(device) = devices.find(|d| d.name().map(|n| n == name).unwrap_or(false)) {
                    return Ok(device);
                }
            }
            warn!(device = name, "preferred output device not found; using default");
        }
        host.default_output_device()
            .ok_or_else(|| MockviewError::DeviceUnavailable("no output device".into()))
    }
}

impl AudioSink for CpalSink {
    fn play(&mut self, audio: &DecodedAudio, stop: &AtomicBool) -> Result<()> {
        if audio.samples.is_empty() {
            return Ok(());
        }
        let device = self.device()?;
        let supported = device
            .default_output_config()
            .map_err(|e| MockviewError::DeviceUnavailable(e.to_string()))?;
        let device_rate = supported.sample_rate().0;
        let config: StreamConfig = supported.config();

        let samples: Arc<[f32]> = if audio.sample_rate == device_rate {
            audio.samples.clone().into()
        } else {
            let mut rc = RateConverter::new(audio.sample_rate, device_rate, 1024)?;
            let mut out = rc.process(&audio.samples);
            out.extend(rc.flush());
            out.into()
        };
        let total = samples.len();
        let cursor = Arc::new(AtomicUsize::new(0));

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_output::<f32>(&device, &config, Arc::clone(&samples), Arc::clone(&cursor)),
            SampleFormat::I16 => build_output::<i16>(&device, &config, Arc::clone(&samples), Arc::clone(&cursor)),
            SampleFormat::U16 => build_output::<u16>(&device, &config, Arc::clone(&samples), Arc::clone(&cursor)),
            other => Err(MockviewError::DeviceUnavailable(format!(
                "unsupported output format: {other:?}"
            ))),
        }?;
        stream
            .play()
            .map_err(|e| MockviewError::DeviceUnavailable(e.to_string()))?;

        let nominal = Duration::from_secs_f64(total as f64 / device_rate as f64);
        let give_up = Instant::now() + nominal + STALL_MARGIN;
        while cursor.load(Ordering::Acquire) < total {
            if stop.load(Ordering::Acquire) {
                debug!("playback interrupted");
                return Ok(());
            }
            if Instant::now() >= give_up {
                return Err(MockviewError::DeviceUnavailable(
                    "output device stalled".into(),
                ));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        // Let the device drain its last buffer before the stream drops.
        std::thread::sleep(POLL_INTERVAL * 5);
        Ok(())
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    samples: Arc<[f32]>,
    cursor: Arc<AtomicUsize>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    device
        .build_output_stream(
            config,
            move |output: &mut [T], _info: &cpal::OutputCallbackInfo| {
                for frame in output.chunks_mut(channels) {
                    let idx = cursor.fetch_add(1, Ordering::AcqRel);
                    let value = samples.get(idx).copied().unwrap_or(0.0);
                    let sample = T::from_sample(value);
                    for out in frame.iter_mut() {
                        *out = sample;
                    }
                }
            },
            |err| error!("output stream error: {err}"),
            None,
        )
        .map_err(|e| MockviewError::DeviceUnavailable(e.to_string()))
}
