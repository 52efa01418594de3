//! # mockview-core
//!
//! Client audio core for live mock-interview conversations.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → capture pump (spawn_blocking)
//!                                                    │ 16 kHz frames
//!                                              Dispatcher task
//!                                   SpeechDetector → UtteranceBuffer
//!                                                    │
//!                                 TurnGate ◄──── RelayChannel ────► agent (websocket)
//!                                     │                 │ agent audio
//!                                     └──── PlaybackQueue ◄── SegmentAssembler
//!                                                    │
//!                                        broadcast::Sender<SessionEvent>
//! ```
//!
//! The capture callback is zero-alloc. All turn state lives in the dispatcher
//! task; the microphone is ignored whenever the turn gate is closed.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod client;
pub mod engine;
pub mod error;
pub mod events;
pub mod playback;
pub mod relay;
pub mod turn;
pub mod vad;

pub use client::{ApiClient, ConnectionParams, ResumeUpload};
pub use engine::{FrameSource, SessionConfig, VoiceSession};
pub use error::{MockviewError, Result};
pub use events::{ErrorKind, SessionEvent, SessionStatus};
pub use playback::{AudioCodec, AudioSink, PlaybackEvent};
pub use turn::{TurnGate, TurnGateConfig, TurnState};
pub use vad::{DetectorConfig, EnergyVad, SpeechDetector};

#[cfg(feature = "audio-cpal")]
pub use audio::output::CpalSink;
