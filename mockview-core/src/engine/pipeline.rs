//! The session dispatcher: single owner of all per-session audio state.
//!
//! ## Inputs (one ordered channel each)
//!
//! ```text
//! capture pump ──AudioFrame──┐
//! relay task ──RelayEvent────┼──► Dispatcher ──► relay (utterances)
//! playback worker ─Playback──┤            └────► playback queue (segments)
//! turn-gate deadline ────────┘            └────► broadcast<SessionEvent>
//! ```
//!
//! Every `handle_*` method is synchronous and takes the current instant, so
//! the state machine can be driven directly in tests. `run` is the async
//! loop that feeds it.

use std::future::pending;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::buffering::frame::AudioFrame;
use crate::buffering::utterance::UtteranceBuffer;
use crate::error::MockviewError;
use crate::events::{ResponsePhase, SessionEvent, SessionStatus};
use crate::playback::{AssemblerOutput, PlaybackEvent, PlaybackQueue, SegmentAssembler};
use crate::relay::{RelayChannel, RelayEvent, RelayTransport, SendOutcome, ServerMessage};
use crate::turn::{TransitionCause, Transition, TurnGate, TurnState};
use crate::vad::{EnergyVad, SpeechDetector};

use super::SessionConfig;

/// Counters for `vad_replay` and debug logging.
#[derive(Debug, Default)]
pub struct SessionDiagnostics {
    pub frames_in: AtomicUsize,
    pub frames_gated: AtomicUsize,
    pub utterances_sent: AtomicUsize,
    pub utterances_dropped: AtomicUsize,
    pub segments_queued: AtomicUsize,
    pub segments_skipped: AtomicUsize,
    pub gate_timeouts: AtomicUsize,
    pub ignored_messages: AtomicUsize,
}

impl SessionDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_gated: self.frames_gated.load(Ordering::Relaxed),
            utterances_sent: self.utterances_sent.load(Ordering::Relaxed),
            utterances_dropped: self.utterances_dropped.load(Ordering::Relaxed),
            segments_queued: self.segments_queued.load(Ordering::Relaxed),
            segments_skipped: self.segments_skipped.load(Ordering::Relaxed),
            gate_timeouts: self.gate_timeouts.load(Ordering::Relaxed),
            ignored_messages: self.ignored_messages.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub frames_gated: usize,
    pub utterances_sent: usize,
    pub utterances_dropped: usize,
    pub segments_queued: usize,
    pub segments_skipped: usize,
    pub gate_timeouts: usize,
    pub ignored_messages: usize,
}

/// Receivers the dispatcher loop selects over.
pub struct DispatcherInputs {
    pub frames: mpsc::Receiver<AudioFrame>,
    pub relay: mpsc::UnboundedReceiver<RelayEvent>,
    pub playback: mpsc::UnboundedReceiver<PlaybackEvent>,
    pub shutdown: oneshot::Receiver<()>,
}

pub struct Dispatcher<T: RelayTransport> {
    detector: SpeechDetector,
    buffer: UtteranceBuffer,
    gate: TurnGate,
    relay: RelayChannel<T>,
    assembler: SegmentAssembler,
    playback: PlaybackQueue,
    events: broadcast::Sender<SessionEvent>,
    diagnostics: Arc<SessionDiagnostics>,
    conversation_ended: bool,
}

impl<T: RelayTransport> Dispatcher<T> {
    pub fn new(
        config: &SessionConfig,
        relay: RelayChannel<T>,
        playback: PlaybackQueue,
        events: broadcast::Sender<SessionEvent>,
        diagnostics: Arc<SessionDiagnostics>,
    ) -> Self {
        Self {
            detector: SpeechDetector::new(
                Box::new(EnergyVad::new(config.vad_threshold)),
                config.detector.clone(),
            ),
            buffer: UtteranceBuffer::new(),
            gate: TurnGate::new(config.turn_gate.clone()),
            relay,
            assembler: SegmentAssembler::new(config.agent_audio),
            playback,
            events,
            diagnostics,
            conversation_ended: false,
        }
    }

    pub fn turn_state(&self) -> TurnState {
        self.gate.state()
    }

    pub fn relay(&self) -> &RelayChannel<T> {
        &self.relay
    }

    pub fn conversation_ended(&self) -> bool {
        self.conversation_ended
    }

    // ── capture ─────────────────────────────────────────────────────────────

    pub fn handle_frame(&mut self, frame: AudioFrame, now: Instant) {
        self.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);
        if !self.gate.is_open() {
            self.diagnostics.frames_gated.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let outcome = self.detector.process(&frame);
        let Some(utterance) = self.buffer.accept(&frame, &outcome) else {
            return;
        };

        match self.relay.send_utterance(&utterance) {
            SendOutcome::Sent { frames } => {
                self.diagnostics.utterances_sent.fetch_add(1, Ordering::Relaxed);
                self.emit(SessionEvent::UtteranceSent {
                    frames,
                    duration_ms: utterance.duration().as_millis() as u64,
                });
                let transitions = self.gate.utterance_sent(now);
                self.apply(transitions);
            }
            SendOutcome::Dropped => {
                self.diagnostics.utterances_dropped.fetch_add(1, Ordering::Relaxed);
                self.emit(SessionEvent::UtteranceDropped {
                    reason: "relay not ready".into(),
                });
            }
        }
    }

    // ── relay ───────────────────────────────────────────────────────────────

    pub fn handle_relay(&mut self, event: RelayEvent, now: Instant) {
        self.gate.inbound_activity(now);
        match event {
            RelayEvent::Control(msg) => self.handle_control(msg, now),
            RelayEvent::Audio(chunk) => {
                if self.assembler.push(&chunk) == AssemblerOutput::Stray {
                    self.diagnostics.ignored_messages.fetch_add(1, Ordering::Relaxed);
                }
            }
            RelayEvent::Closed { reason } => {
                warn!(%reason, "relay closed");
                self.relay.close();
                self.assembler.reset();
                if !self.conversation_ended {
                    let err = MockviewError::ConnectionUnavailable(reason);
                    self.emit(SessionEvent::from_error(&err));
                }
            }
        }
    }

    fn handle_control(&mut self, msg: ServerMessage, now: Instant) {
        match msg {
            ServerMessage::ConversationStarted { id } => {
                info!(conversation_id = ?id, "conversation started");
                self.emit(SessionEvent::Status {
                    status: SessionStatus::Listening,
                    detail: id,
                });
            }
            ServerMessage::AddPartialTranscript { metadata } => self.emit(SessionEvent::Transcript {
                text: metadata.transcript,
                is_final: false,
            }),
            ServerMessage::AddTranscript { metadata } => self.emit(SessionEvent::Transcript {
                text: metadata.transcript,
                is_final: true,
            }),
            ServerMessage::ResponseStarted { content } => {
                self.emit(SessionEvent::AgentResponse {
                    phase: ResponsePhase::Started,
                    text: content,
                });
                if self.assembler.start() == AssemblerOutput::Opened {
                    let transitions = self.gate.agent_audio_started(now);
                    self.apply(transitions);
                }
            }
            ServerMessage::ResponseCompleted { content } => {
                self.emit(SessionEvent::AgentResponse {
                    phase: ResponsePhase::Completed,
                    text: content,
                });
                self.finish_response(now);
            }
            ServerMessage::ResponseInterrupted { content } => {
                self.emit(SessionEvent::AgentResponse {
                    phase: ResponsePhase::Interrupted,
                    text: content,
                });
                self.finish_response(now);
            }
            ServerMessage::AudioAdded { seq_no } => debug!(seq_no, "agent acknowledged audio"),
            ServerMessage::Info { kind, reason } => self.emit(SessionEvent::Notice {
                level: "info".into(),
                kind,
                reason,
            }),
            ServerMessage::Warning { kind, reason } => {
                warn!(?kind, ?reason, "agent warning");
                self.emit(SessionEvent::Notice {
                    level: "warning".into(),
                    kind,
                    reason,
                });
            }
            ServerMessage::Error { kind, reason } => {
                warn!(?kind, ?reason, "agent error");
                self.emit(SessionEvent::Error {
                    kind: crate::events::ErrorKind::Agent,
                    message: reason.or(kind).unwrap_or_else(|| "agent error".into()),
                    user_facing: true,
                });
            }
            ServerMessage::ConversationEnded => {
                info!("conversation ended by agent");
                self.conversation_ended = true;
                self.emit(SessionEvent::ConversationEnded);
            }
            ServerMessage::Unknown => {
                self.diagnostics.ignored_messages.fetch_add(1, Ordering::Relaxed);
                debug!("ignoring unrecognised control message");
            }
        }
    }

    fn finish_response(&mut self, now: Instant) {
        match self.assembler.finish() {
            AssemblerOutput::Segment(segment) => {
                let duration = segment.estimated_duration();
                let id = segment.id;
                match self.playback.enqueue(segment) {
                    Ok(()) => {
                        self.diagnostics.segments_queued.fetch_add(1, Ordering::Relaxed);
                        let transitions = self.gate.playback_scheduled(now, duration);
                        self.apply(transitions);
                    }
                    Err(e) => {
                        warn!(id, error = %e, "could not queue agent audio");
                        self.release_if_idle();
                    }
                }
            }
            AssemblerOutput::Empty | AssemblerOutput::Ignored => self.release_if_idle(),
            AssemblerOutput::Opened | AssemblerOutput::Buffered | AssemblerOutput::Stray => {}
        }
    }

    // ── playback ────────────────────────────────────────────────────────────

    pub fn handle_playback(&mut self, event: PlaybackEvent) {
        match &event {
            PlaybackEvent::SegmentSkipped { id, reason } => {
                self.diagnostics.segments_skipped.fetch_add(1, Ordering::Relaxed);
                let err = MockviewError::DecodeFailure(format!("segment {id}: {reason}"));
                self.emit(SessionEvent::from_error(&err));
            }
            PlaybackEvent::Drained => self.release_if_idle(),
            PlaybackEvent::SegmentStarted { .. } | PlaybackEvent::SegmentFinished { .. } => {}
        }
        self.emit(SessionEvent::Playback { event });
    }

    /// Reopen the microphone once nothing is queued and no response is
    /// still streaming in. A stale `Drained` that raced a new enqueue is
    /// ignored here.
    fn release_if_idle(&mut self) {
        if self.playback.pending() == 0 && !self.assembler.is_collecting() {
            let transitions = self.gate.playback_complete();
            self.apply(transitions);
        }
    }

    // ── gate ────────────────────────────────────────────────────────────────

    pub fn handle_deadline(&mut self, now: Instant) {
        let transitions = self.gate.poll_timeout(now);
        self.apply(transitions);
    }

    fn apply(&mut self, transitions: Vec<Transition>) {
        for t in transitions {
            if t.from == TurnState::Idle {
                // Anything half-heard when the gate closed belongs to no turn.
                self.detector.reset();
                self.buffer.clear();
            }
            self.emit(SessionEvent::TurnChanged {
                from: t.from,
                to: t.to,
                cause: t.cause,
            });
            if t.cause == TransitionCause::Timeout {
                self.diagnostics.gate_timeouts.fetch_add(1, Ordering::Relaxed);
                let err = MockviewError::Timeout(format!("no reply while {}", t.from));
                self.emit(SessionEvent::from_error(&err));
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── lifecycle ───────────────────────────────────────────────────────────

    /// Stop sending and close the relay. Idempotent.
    pub fn close_relay(&mut self) {
        self.relay.close();
    }

    /// Stop playback and join the worker. Idempotent.
    pub fn shutdown_playback(&mut self) {
        self.playback.shutdown();
    }

    /// Drive the dispatcher until `inputs.shutdown` fires or is dropped.
    /// The relay is closed on the way out; playback is left to the caller.
    pub async fn run(mut self, mut inputs: DispatcherInputs) -> Self {
        info!("dispatcher started");
        loop {
            let deadline = self.gate.deadline();
            let gate_timer = async move {
                match deadline {
                    Some(at) => sleep_until(at).await,
                    None => pending::<()>().await,
                }
            };

            tokio::select! {
                biased;
                _ = &mut inputs.shutdown => break,
                Some(event) = inputs.playback.recv() => self.handle_playback(event),
                Some(event) = inputs.relay.recv() => self.handle_relay(event, Instant::now()),
                Some(frame) = inputs.frames.recv() => self.handle_frame(frame, Instant::now()),
                _ = gate_timer => self.handle_deadline(Instant::now()),
            }
        }
        self.close_relay();
        info!(diagnostics = ?self.diagnostics.snapshot(), "dispatcher stopped");
        self
    }
}
