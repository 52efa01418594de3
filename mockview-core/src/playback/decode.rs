//! Agent audio decoding to mono f32.

use std::io::Cursor;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffering::frame::{samples_to_duration, CAPTURE_SAMPLE_RATE};
use crate::error::{MockviewError, Result};

/// Encodings the agent may stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AudioCodec {
    /// Headerless signed 16-bit little-endian mono PCM.
    PcmS16Le { sample_rate: u32 },
    /// RIFF/WAVE container.
    Wav,
}

impl Default for AudioCodec {
    fn default() -> Self {
        AudioCodec::PcmS16Le {
            sample_rate: CAPTURE_SAMPLE_RATE,
        }
    }
}

/// Decoded mono audio ready for an output sink.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration(&self) -> Duration {
        samples_to_duration(self.samples.len(), self.sample_rate)
    }
}

pub fn decode(bytes: &[u8], codec: AudioCodec) -> Result<DecodedAudio> {
    match codec {
        AudioCodec::PcmS16Le { sample_rate } => decode_pcm_s16le(bytes, sample_rate),
        AudioCodec::Wav => decode_wav(bytes),
    }
}

fn decode_pcm_s16le(bytes: &[u8], sample_rate: u32) -> Result<DecodedAudio> {
    if bytes.is_empty() {
        return Err(MockviewError::DecodeFailure("empty PCM segment".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(MockviewError::DecodeFailure(format!(
            "PCM segment has odd length {}",
            bytes.len()
        )));
    }
    if sample_rate == 0 {
        return Err(MockviewError::DecodeFailure("PCM sample rate is zero".into()));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();
    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}

fn decode_wav(bytes: &[u8]) -> Result<DecodedAudio> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| MockviewError::DecodeFailure(format!("WAV header: {e}")))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| MockviewError::DecodeFailure(format!("WAV body: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| MockviewError::DecodeFailure(format!("WAV body: {e}")))?
        }
    };

    let samples = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect::<Vec<_>>();
    if samples.is_empty() {
        return Err(MockviewError::DecodeFailure("WAV segment has no samples".into()));
    }
    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Playback length without decoding the full body. Unknown lengths are zero.
pub fn estimate_duration(bytes: &[u8], codec: AudioCodec) -> Duration {
    match codec {
        AudioCodec::PcmS16Le { sample_rate } => samples_to_duration(bytes.len() / 2, sample_rate),
        AudioCodec::Wav => match hound::WavReader::new(Cursor::new(bytes)) {
            Ok(reader) => samples_to_duration(reader.duration() as usize, reader.spec().sample_rate),
            Err(_) => Duration::ZERO,
        },
    }
}
