//! Replay a WAV file through the speech detector and dump each utterance.
//!
//! Useful for tuning `--threshold`, `--hangover` and `--min-speech-ms`
//! against real recordings without a relay or an audio device.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mockview_core::audio::resample::RateConverter;
use mockview_core::buffering::frame::{CAPTURE_SAMPLE_RATE, FRAME_SAMPLES};
use mockview_core::buffering::utterance::UtteranceBuffer;
use mockview_core::engine::capture::FrameCutter;
use mockview_core::vad::{DetectorConfig, EnergyVad, SpeechDetector, VadEvent};
use serde::Serialize;

#[derive(Debug)]
struct Args {
    input: PathBuf,
    output_dir: Option<PathBuf>,
    threshold: f32,
    hangover_frames: u32,
    min_speech_ms: u64,
}

#[derive(Debug, Serialize)]
struct UtteranceReport {
    index: usize,
    start_ms: u64,
    duration_ms: u64,
    frames: usize,
    file: Option<String>,
}

#[derive(Debug, Serialize)]
struct Report {
    input: String,
    source_sample_rate: u32,
    frames: usize,
    speech_frames: usize,
    too_short: usize,
    utterances: Vec<UtteranceReport>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("vad_replay failed: {e}");
        std::process::exit(1);
    }
}

fn parse_args() -> Result<Args, String> {
    let mut input: Option<PathBuf> = None;
    let mut output_dir: Option<PathBuf> = None;
    let defaults = DetectorConfig::default();
    let mut threshold = 0.015f32;
    let mut hangover_frames = defaults.hangover_frames;
    let mut min_speech_ms = defaults.min_speech.as_millis() as u64;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().ok_or_else(|| format!("missing value for {name}"));
        match arg.as_str() {
            "--input" => input = Some(PathBuf::from(value("--input")?)),
            "--output" => output_dir = Some(PathBuf::from(value("--output")?)),
            "--threshold" => {
                threshold = value("--threshold")?
                    .parse()
                    .map_err(|_| "invalid value for --threshold".to_string())?
            }
            "--hangover" => {
                hangover_frames = value("--hangover")?
                    .parse()
                    .map_err(|_| "invalid value for --hangover".to_string())?
            }
            "--min-speech-ms" => {
                min_speech_ms = value("--min-speech-ms")?
                    .parse()
                    .map_err(|_| "invalid value for --min-speech-ms".to_string())?
            }
            "--help" | "-h" => {
                println!(
                    "Usage: cargo run -p mockview-core --bin vad_replay -- \\
  --input <file.wav> [--output <dir>] [--threshold <rms>] [--hangover <frames>] [--min-speech-ms <ms>]"
                );
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(Args {
        input: input.ok_or("--input is required")?,
        output_dir,
        threshold,
        hangover_frames: hangover_frames.max(1),
        min_speech_ms,
    })
}

fn read_wav_mono_f32(path: &Path) -> Result<(Vec<f32>, u32), String> {
    let mut reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int if spec.bits_per_sample <= 16 => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0).map_err(|e| e.to_string()))
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max).map_err(|e| e.to_string()))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if channels == 1 {
        return Ok((interleaved, spec.sample_rate));
    }
    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

fn run() -> Result<(), String> {
    let args = parse_args()?;
    let (samples, source_rate) = read_wav_mono_f32(&args.input)?;

    let mut converter =
        RateConverter::new(source_rate, CAPTURE_SAMPLE_RATE, 1024).map_err(|e| e.to_string())?;
    let mut resampled = converter.process(&samples);
    resampled.extend(converter.flush());

    let mut cutter = FrameCutter::new(FRAME_SAMPLES);
    let frames = cutter.push(&resampled);

    let mut detector = SpeechDetector::new(
        Box::new(EnergyVad::new(args.threshold)),
        DetectorConfig {
            hangover_frames: args.hangover_frames,
            min_speech: Duration::from_millis(args.min_speech_ms),
        },
    );
    let mut buffer = UtteranceBuffer::new();

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir).map_err(|e| e.to_string())?;
    }

    let frame_ms = FRAME_SAMPLES as u64 * 1000 / CAPTURE_SAMPLE_RATE as u64;
    let mut speech_frames = 0usize;
    let mut too_short = 0usize;
    let mut start_frame = 0usize;
    let mut utterances = Vec::new();

    for (idx, frame) in frames.iter().enumerate() {
        let outcome = detector.process(frame);
        if outcome.decision.is_speech() {
            speech_frames += 1;
        }
        match outcome.event {
            Some(VadEvent::SpeechStart) => start_frame = idx,
            Some(VadEvent::SpeechTooShort { .. }) => too_short += 1,
            _ => {}
        }
        let Some(utterance) = buffer.accept(frame, &outcome) else {
            continue;
        };

        let index = utterances.len();
        let file = match &args.output_dir {
            Some(dir) => {
                let path = dir.join(format!("utterance_{index:03}.wav"));
                let bytes = utterance.to_wav_bytes().map_err(|e| e.to_string())?;
                std::fs::write(&path, bytes).map_err(|e| e.to_string())?;
                Some(path.to_string_lossy().into_owned())
            }
            None => None,
        };
        utterances.push(UtteranceReport {
            index,
            start_ms: start_frame as u64 * frame_ms,
            duration_ms: utterance.duration().as_millis() as u64,
            frames: utterance.frames().len(),
            file,
        });
    }

    let report = Report {
        input: args.input.to_string_lossy().into_owned(),
        source_sample_rate: source_rate,
        frames: frames.len(),
        speech_frames,
        too_short,
        utterances,
    };
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}
