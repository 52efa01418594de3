//! Bidirectional relay to the remote conversational agent.
//!
//! Outbound: each utterance goes out as binary s16le PCM frames followed by
//! one `EndOfUtterance` control message. Inbound: JSON control messages and
//! binary agent audio, delivered as typed `RelayEvent`s.

pub mod loopback;
pub mod messages;
pub mod ws;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::buffering::utterance::Utterance;
use crate::error::Result;

pub use loopback::LoopbackTransport;
pub use messages::{ClientMessage, ServerMessage};
pub use ws::WsTransport;

/// Inbound traffic from the agent, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Control(ServerMessage),
    Audio(Bytes),
    Closed { reason: String },
}

/// One outbound websocket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Binary(Bytes),
    Text(String),
}

/// The sending half of a relay connection.
///
/// `send` only queues; it must never block the dispatcher on network I/O.
pub trait RelayTransport: Send {
    /// Whether the agent has accepted the conversation and will take audio.
    fn is_ready(&self) -> bool;

    fn send(&mut self, frame: OutboundFrame) -> Result<()>;

    /// Close the connection. Must be safe to call more than once.
    fn close(&mut self);
}

impl<T: RelayTransport + ?Sized> RelayTransport for Box<T> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        (**self).send(frame)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { frames: usize },
    Dropped,
}

/// Utterance framing and sequence numbering on top of a transport.
#[derive(Debug)]
pub struct RelayChannel<T: RelayTransport> {
    transport: T,
    seq_no: u64,
    closed: bool,
}

impl<T: RelayTransport> RelayChannel<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            seq_no: 0,
            closed: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.closed && self.transport.is_ready()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of audio frames sent on this connection so far.
    pub fn seq_no(&self) -> u64 {
        self.seq_no
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send one utterance. Fire-and-forget: if the connection is not ready
    /// the utterance is dropped and `SendOutcome::Dropped` returned.
    pub fn send_utterance(&mut self, utterance: &Utterance) -> SendOutcome {
        if !self.is_ready() {
            debug!(
                frames = utterance.frames().len(),
                closed = self.closed,
                "relay not ready; dropping utterance"
            );
            return SendOutcome::Dropped;
        }

        match self.try_send_utterance(utterance) {
            Ok(frames) => {
                debug!(frames, last_seq_no = self.seq_no, "utterance sent");
                SendOutcome::Sent { frames }
            }
            Err(e) => {
                warn!(error = %e, "relay send failed; utterance dropped");
                SendOutcome::Dropped
            }
        }
    }

    fn try_send_utterance(&mut self, utterance: &Utterance) -> Result<usize> {
        for frame in utterance.frames() {
            self.transport
                .send(OutboundFrame::Binary(Bytes::from(frame.to_le_bytes())))?;
            self.seq_no += 1;
        }
        let end = ClientMessage::EndOfUtterance {
            last_seq_no: self.seq_no,
        };
        self.transport.send(OutboundFrame::Text(end.to_json()?))?;
        Ok(utterance.frames().len())
    }

    /// Announce end of audio and close the transport. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.transport.is_ready() {
            let ended = ClientMessage::AudioEnded {
                last_seq_no: self.seq_no,
            };
            match ended.to_json() {
                Ok(json) => {
                    if let Err(e) = self.transport.send(OutboundFrame::Text(json)) {
                        debug!(error = %e, "could not announce end of audio");
                    }
                }
                Err(e) => debug!(error = %e, "could not encode AudioEnded"),
            }
        }
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::frame::{AudioFrame, CAPTURE_SAMPLE_RATE};

    fn utterance(frames: usize) -> Utterance {
        Utterance::new(
            (0..frames)
                .map(|i| AudioFrame::new(vec![i as i16; 4], CAPTURE_SAMPLE_RATE))
                .collect(),
        )
    }

    #[test]
    fn frames_then_end_of_utterance_in_order() {
        let transport = LoopbackTransport::ready();
        let sent = transport.sent();
        let mut relay = RelayChannel::new(transport);

        assert_eq!(relay.send_utterance(&utterance(3)), SendOutcome::Sent { frames: 3 });

        let frames = sent.lock().clone();
        assert_eq!(frames.len(), 4);
        for (i, f) in frames[..3].iter().enumerate() {
            let expected = AudioFrame::new(vec![i as i16; 4], CAPTURE_SAMPLE_RATE).to_le_bytes();
            assert_eq!(f, &OutboundFrame::Binary(Bytes::from(expected)));
        }
        assert_eq!(
            frames[3],
            OutboundFrame::Text(r#"{"message":"EndOfUtterance","last_seq_no":3}"#.into())
        );
    }

    #[test]
    fn sends_before_ready_are_dropped_then_resume() {
        let transport = LoopbackTransport::new();
        let sent = transport.sent();
        let ready = transport.ready_flag();
        let mut relay = RelayChannel::new(transport);

        assert_eq!(relay.send_utterance(&utterance(2)), SendOutcome::Dropped);
        assert!(sent.lock().is_empty());
        assert_eq!(relay.seq_no(), 0);

        ready.store(true, std::sync::atomic::Ordering::Release);
        assert_eq!(relay.send_utterance(&utterance(2)), SendOutcome::Sent { frames: 2 });
        assert_eq!(sent.lock().len(), 3);
    }

    #[test]
    fn sequence_numbers_accumulate_across_utterances() {
        let transport = LoopbackTransport::ready();
        let sent = transport.sent();
        let mut relay = RelayChannel::new(transport);
        relay.send_utterance(&utterance(2));
        relay.send_utterance(&utterance(3));
        assert_eq!(relay.seq_no(), 5);
        let last = sent.lock().last().cloned();
        assert_eq!(
            last,
            Some(OutboundFrame::Text(
                r#"{"message":"EndOfUtterance","last_seq_no":5}"#.into()
            ))
        );
    }

    #[test]
    fn close_is_idempotent_and_stops_sending() {
        let transport = LoopbackTransport::ready();
        let sent = transport.sent();
        let mut relay = RelayChannel::new(transport);
        relay.send_utterance(&utterance(1));
        relay.close();
        relay.close();

        let frames = sent.lock().clone();
        assert_eq!(
            frames.last(),
            Some(&OutboundFrame::Text(
                r#"{"message":"AudioEnded","last_seq_no":1}"#.into()
            ))
        );
        assert_eq!(relay.transport().close_count(), 1);
        assert_eq!(relay.send_utterance(&utterance(1)), SendOutcome::Dropped);
        assert_eq!(sent.lock().len(), frames.len());
    }

    #[test]
    fn close_without_connection_sends_nothing() {
        let transport = LoopbackTransport::new();
        let sent = transport.sent();
        let mut relay = RelayChannel::new(transport);
        relay.close();
        assert!(sent.lock().is_empty());
    }
}
