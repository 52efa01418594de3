//! Microphone capture and speaker output via cpal.
//!
//! # Real-time constraints
//!
//! The cpal input callback runs on an OS audio thread. It downmixes to mono
//! and pushes into the SPSC ring producer, which is lock-free. It never
//! blocks, performs I/O, or talks to the session directly.
//!
//! # Threading
//!
//! `cpal::Stream` is `!Send` on several platforms, so `AudioCapture` must be
//! created and dropped on the same thread. The capture pump opens it inside
//! its own blocking thread.

pub mod device;
#[cfg(feature = "audio-cpal")]
pub mod output;
pub mod resample;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use crate::buffering::AudioProducer;
#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::error::{MockviewError, Result};

/// An open microphone stream feeding the capture ring.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
    /// Native device rate (Hz); the capture pump resamples from this.
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open the named input device, or the system default when `preferred`
    /// is `None` or not found.
    ///
    /// Fails with `DeviceUnavailable` when no input exists, permission is
    /// denied, or the stream cannot be built.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        producer: AudioProducer,
        running: Arc<AtomicBool>,
        preferred: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let preferred_device = preferred.and_then(|name| {
            let found = host
                .input_devices()
                .ok()?
                .find(|d| d.name().map(|n| n == name).unwrap_or(false));
            if found.is_none() {
                warn!(device = name, "preferred input device not found; using default");
            }
            found
        });
        let device = match preferred_device.or_else(|| host.default_input_device()) {
            Some(device) => device,
            None => host
                .input_devices()
                .map_err(|e| MockviewError::DeviceUnavailable(e.to_string()))?
                .next()
                .ok_or_else(|| MockviewError::DeviceUnavailable("no input device".into()))?,
        };

        let supported = device
            .default_input_config()
            .map_err(|e| MockviewError::DeviceUnavailable(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate,
            channels,
            "opening input device"
        );

        let config: StreamConfig = supported.config();
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_input::<f32>(&device, &config, producer, Arc::clone(&running)),
            SampleFormat::I16 => build_input::<i16>(&device, &config, producer, Arc::clone(&running)),
            SampleFormat::U16 => build_input::<u16>(&device, &config, producer, Arc::clone(&running)),
            SampleFormat::U8 => build_input::<u8>(&device, &config, producer, Arc::clone(&running)),
            other => Err(MockviewError::DeviceUnavailable(format!(
                "unsupported sample format: {other:?}"
            ))),
        }?;
        stream
            .play()
            .map_err(|e| MockviewError::DeviceUnavailable(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    #[cfg(not(feature = "audio-cpal"))]
    pub fn open(
        _producer: AudioProducer,
        _running: Arc<AtomicBool>,
        _preferred: Option<&str>,
    ) -> Result<Self> {
        Err(MockviewError::DeviceUnavailable(
            "built without the audio-cpal feature".into(),
        ))
    }

    /// Make the callback discard input from now on.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(feature = "audio-cpal")]
fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: AudioProducer,
    running: Arc<AtomicBool>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let mut mono: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let frames = data.len() / channels;
                mono.resize(frames, 0.0);
                for (out, frame) in mono.iter_mut().zip(data.chunks_exact(channels)) {
                    let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
                    *out = sum / channels as f32;
                }
                let written = producer.push_slice(&mono);
                if written < mono.len() {
                    warn!(dropped = mono.len() - written, "capture ring full");
                }
            },
            |err| error!("input stream error: {err}"),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::DeviceNotAvailable => {
                MockviewError::DeviceUnavailable("input device disappeared".into())
            }
            other => MockviewError::DeviceUnavailable(other.to_string()),
        })
}
