//! `VoiceSession`: top-level lifecycle for one live interview conversation.
//!
//! ## Lifecycle
//!
//! ```text
//! VoiceSession::connect()   → relay open, mic open, playback worker up, status = Connecting
//!     ConversationStarted   → status = Listening
//!     └─► close()           → relay closed → mic released → playback stopped, status = Stopped
//! ```
//!
//! `close()` is idempotent. Capture failures surface from `connect`/`start`
//! as `DeviceUnavailable`; everything after that is reported on the event
//! stream.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send`, so the microphone is opened inside the capture
//! pump's blocking thread and the speaker stream inside the playback worker.
//! The dispatcher runs as a single tokio task and owns all turn state.

pub mod capture;
pub mod pipeline;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::buffering::frame::{AudioFrame, FRAME_SAMPLES};
use crate::client::ConnectionParams;
use crate::error::{MockviewError, Result};
use crate::events::{SessionEvent, SessionStatus};
use crate::playback::{AudioCodec, AudioSink, PlaybackQueue};
use crate::relay::{RelayChannel, RelayEvent, RelayTransport, WsTransport};
use crate::turn::TurnGateConfig;
use crate::vad::DetectorConfig;

use capture::CaptureHandle;
use pipeline::{Dispatcher, DispatcherInputs, SessionDiagnostics};

pub use pipeline::DiagnosticsSnapshot;

/// Broadcast channel capacity for slow event consumers.
const BROADCAST_CAP: usize = 256;
/// Frames buffered between the capture pump and the dispatcher (~16 s).
const FRAME_QUEUE: usize = 64;

/// Configuration for a `VoiceSession`.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// RMS threshold on normalized samples; a frame is speech when its RMS
    /// is strictly greater. Default: 0.015.
    pub vad_threshold: f32,
    pub detector: DetectorConfig,
    pub turn_gate: TurnGateConfig,
    /// Encoding of agent audio on the relay. Default: 16 kHz s16le PCM.
    pub agent_audio: AudioCodec,
    /// Samples per capture frame at 16 kHz. Default: 4096.
    pub frame_samples: usize,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vad_threshold: 0.015,
            detector: DetectorConfig::default(),
            turn_gate: TurnGateConfig::default(),
            agent_audio: AudioCodec::default(),
            frame_samples: FRAME_SAMPLES,
            input_device: None,
            output_device: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Where captured frames come from.
pub enum FrameSource {
    /// Open a cpal input device (`None` picks the system default).
    Microphone { device: Option<String> },
    /// Pre-cut 16 kHz frames, e.g. from a file or a test.
    Channel(mpsc::Receiver<AudioFrame>),
}

type BoxedDispatcher = Dispatcher<Box<dyn RelayTransport>>;

pub struct VoiceSession {
    events: broadcast::Sender<SessionEvent>,
    diagnostics: Arc<SessionDiagnostics>,
    shutdown: Option<oneshot::Sender<()>>,
    dispatcher: Option<JoinHandle<BoxedDispatcher>>,
    capture: Option<CaptureHandle>,
}

impl VoiceSession {
    /// Connect the websocket relay and start a session on the default
    /// microphone and speakers (or the ones named in `config`).
    #[cfg(feature = "audio-cpal")]
    pub async fn connect(params: &ConnectionParams, config: SessionConfig) -> Result<Self> {
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let transport = WsTransport::connect(params, relay_tx, config.connect_timeout).await?;
        let sink = crate::audio::output::CpalSink::new(config.output_device.clone());
        let source = FrameSource::Microphone {
            device: config.input_device.clone(),
        };
        Self::start(Box::new(transport), relay_rx, sink, source, config).await
    }

    /// Connect the websocket relay with an explicit sink and frame source.
    pub async fn connect_with<S: AudioSink>(
        params: &ConnectionParams,
        sink: S,
        source: FrameSource,
        config: SessionConfig,
    ) -> Result<Self> {
        let (relay_tx, relay_rx) = mpsc::unbounded_channel();
        let transport = WsTransport::connect(params, relay_tx, config.connect_timeout).await?;
        Self::start(Box::new(transport), relay_rx, sink, source, config).await
    }

    /// Start a session over any transport.
    pub async fn start<S: AudioSink>(
        transport: Box<dyn RelayTransport>,
        relay_events: mpsc::UnboundedReceiver<RelayEvent>,
        sink: S,
        source: FrameSource,
        config: SessionConfig,
    ) -> Result<Self> {
        let (events, _) = broadcast::channel(BROADCAST_CAP);
        let diagnostics = Arc::new(SessionDiagnostics::default());
        let mut relay = RelayChannel::new(transport);

        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let playback = match PlaybackQueue::start(sink, playback_tx) {
            Ok(p) => p,
            Err(e) => {
                relay.close();
                return Err(e);
            }
        };

        let (frames, capture) = match source {
            FrameSource::Channel(rx) => (rx, None),
            FrameSource::Microphone { device } => {
                let (tx, rx) = mpsc::channel(FRAME_QUEUE);
                match capture::start_capture(device, config.frame_samples, tx).await {
                    Ok(handle) => (rx, Some(handle)),
                    Err(e) => {
                        warn!(error = %e, "microphone unavailable; aborting session");
                        relay.close();
                        let mut playback = playback;
                        tokio::task::spawn_blocking(move || playback.shutdown());
                        return Err(e);
                    }
                }
            }
        };

        let _ = events.send(SessionEvent::Status {
            status: SessionStatus::Connecting,
            detail: None,
        });

        let dispatcher = Dispatcher::new(
            &config,
            relay,
            playback,
            events.clone(),
            Arc::clone(&diagnostics),
        );
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(dispatcher.run(DispatcherInputs {
            frames,
            relay: relay_events,
            playback: playback_rx,
            shutdown: shutdown_rx,
        }));

        info!("voice session started");
        Ok(Self {
            events,
            diagnostics,
            shutdown: Some(shutdown_tx),
            dispatcher: Some(handle),
            capture,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn is_open(&self) -> bool {
        self.dispatcher.is_some()
    }

    /// Tear the session down: relay first, then the microphone, then
    /// playback. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        let Some(handle) = self.dispatcher.take() else {
            return Ok(());
        };
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        // The dispatcher closes the relay as it exits.
        let dispatcher = handle
            .await
            .map_err(|e| MockviewError::Other(anyhow::anyhow!("dispatcher task failed: {e}")));

        if let Some(capture) = self.capture.take() {
            capture.stop();
        }

        let mut dispatcher = dispatcher?;
        tokio::task::spawn_blocking(move || {
            dispatcher.shutdown_playback();
        })
        .await
        .map_err(|e| MockviewError::Other(anyhow::anyhow!("playback shutdown failed: {e}")))?;

        let _ = self.events.send(SessionEvent::Status {
            status: SessionStatus::Stopped,
            detail: None,
        });
        info!(diagnostics = ?self.diagnostics.snapshot(), "voice session closed");
        Ok(())
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
    }
}
