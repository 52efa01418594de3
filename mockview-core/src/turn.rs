//! Turn-taking gate between the candidate and the remote agent.
//!
//! ```text
//!          utterance sent            agent audio starts
//!   Idle ─────────────────► AwaitingResponse ─────────────► AgentSpeaking
//!    ▲                              │                              │
//!    │          timeout             │   playback complete/timeout  │
//!    └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Microphone input is only segmented while the gate is `Idle`. Every
//! non-idle state carries a deadline so a lost message or a stuck playback
//! device can never leave the microphone closed for good.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TurnState {
    Idle,
    AwaitingResponse,
    AgentSpeaking,
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnState::Idle => "idle",
            TurnState::AwaitingResponse => "awaiting_response",
            TurnState::AgentSpeaking => "agent_speaking",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionCause {
    UtteranceSent,
    AgentAudioStarted,
    PlaybackComplete,
    Timeout,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TurnState,
    pub to: TurnState,
    pub cause: TransitionCause,
}

#[derive(Debug, Clone)]
pub struct TurnGateConfig {
    /// How long to wait for agent activity before reopening the mic.
    /// Refreshed by any inbound relay traffic. Default: 10 s.
    pub response_timeout: Duration,
    /// Added to the scheduled playback end before forcing `Idle`. Default: 1 s.
    pub playback_grace: Duration,
}

impl Default for TurnGateConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(10),
            playback_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct TurnGate {
    config: TurnGateConfig,
    state: TurnState,
    deadline: Option<Instant>,
    /// Wall-clock end of all audio handed to playback in this agent turn.
    playback_until: Option<Instant>,
}

impl TurnGate {
    pub fn new(config: TurnGateConfig) -> Self {
        Self {
            config,
            state: TurnState::Idle,
            deadline: None,
            playback_until: None,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// True only when microphone input may be segmented.
    pub fn is_open(&self) -> bool {
        self.state == TurnState::Idle
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn config(&self) -> &TurnGateConfig {
        &self.config
    }

    /// The candidate's utterance has been fully handed to the relay.
    pub fn utterance_sent(&mut self, now: Instant) -> Vec<Transition> {
        if self.state != TurnState::Idle {
            debug!(state = %self.state, "utterance sent while gate closed; ignoring");
            return Vec::new();
        }
        self.deadline = Some(now + self.config.response_timeout);
        vec![self.move_to(TurnState::AwaitingResponse, TransitionCause::UtteranceSent)]
    }

    /// The relay signalled the start of an agent response.
    ///
    /// From `Idle` the gate still passes through `AwaitingResponse` so
    /// observers see every edge.
    pub fn agent_audio_started(&mut self, now: Instant) -> Vec<Transition> {
        let mut out = Vec::new();
        if self.state == TurnState::Idle {
            out.push(self.move_to(TurnState::AwaitingResponse, TransitionCause::AgentAudioStarted));
        }
        if self.state == TurnState::AwaitingResponse {
            out.push(self.move_to(TurnState::AgentSpeaking, TransitionCause::AgentAudioStarted));
        }
        if self.playback_until.is_none() {
            self.deadline = Some(now + self.config.response_timeout);
        }
        out
    }

    /// Any inbound relay traffic keeps an unscheduled wait alive.
    pub fn inbound_activity(&mut self, now: Instant) {
        if self.state != TurnState::Idle && self.playback_until.is_none() {
            self.deadline = Some(now + self.config.response_timeout);
        }
    }

    /// A segment of `duration` was queued for playback. The fallback deadline
    /// becomes the end of all scheduled audio plus the grace period.
    pub fn playback_scheduled(&mut self, now: Instant, duration: Duration) -> Vec<Transition> {
        let out = if self.state == TurnState::AgentSpeaking {
            Vec::new()
        } else {
            self.agent_audio_started(now)
        };
        let start = self.playback_until.map_or(now, |until| until.max(now));
        let until = start + duration;
        self.playback_until = Some(until);
        self.deadline = Some(until + self.config.playback_grace);
        debug!(?duration, "playback scheduled");
        out
    }

    /// All queued playback has finished.
    pub fn playback_complete(&mut self) -> Vec<Transition> {
        if self.state != TurnState::AgentSpeaking {
            debug!(state = %self.state, "playback complete outside agent turn; ignoring");
            return Vec::new();
        }
        vec![self.move_to(TurnState::Idle, TransitionCause::PlaybackComplete)]
    }

    /// Force `Idle` if the current deadline has passed.
    pub fn poll_timeout(&mut self, now: Instant) -> Vec<Transition> {
        match self.deadline {
            Some(deadline) if self.state != TurnState::Idle && now >= deadline => {
                warn!(state = %self.state, "turn gate timed out; reopening microphone");
                vec![self.move_to(TurnState::Idle, TransitionCause::Timeout)]
            }
            _ => Vec::new(),
        }
    }

    pub fn reset(&mut self) -> Vec<Transition> {
        if self.state == TurnState::Idle {
            return Vec::new();
        }
        vec![self.move_to(TurnState::Idle, TransitionCause::Reset)]
    }

    fn move_to(&mut self, to: TurnState, cause: TransitionCause) -> Transition {
        let from = self.state;
        self.state = to;
        if to == TurnState::Idle {
            self.deadline = None;
            self.playback_until = None;
        }
        info!(%from, %to, ?cause, "turn state changed");
        Transition { from, to, cause }
    }
}

impl Default for TurnGate {
    fn default() -> Self {
        Self::new(TurnGateConfig::default())
    }
}
