//! Groups streamed agent audio chunks into whole playback segments.
//!
//! A response opens with `ResponseStarted`, carries any number of binary
//! chunks, and closes with `ResponseCompleted` or `ResponseInterrupted`.
//! Chunks arriving outside a response belong to no turn and are dropped.

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use super::{AudioCodec, PlaybackSegment};

#[derive(Debug)]
pub struct SegmentAssembler {
    codec: AudioCodec,
    next_id: u64,
    buffer: Option<BytesMut>,
    chunks: usize,
}

/// What the dispatcher needs to know after feeding the assembler.
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblerOutput {
    /// A new response opened; the agent is about to speak.
    Opened,
    /// More audio was buffered into the open response.
    Buffered,
    /// The response closed with audio to play.
    Segment(PlaybackSegment),
    /// The response closed without any audio.
    Empty,
    /// Nothing happened (e.g. an end marker with no open response).
    Ignored,
    /// An audio chunk arrived with no open response and was discarded.
    Stray,
}

impl SegmentAssembler {
    pub fn new(codec: AudioCodec) -> Self {
        Self {
            codec,
            next_id: 1,
            buffer: None,
            chunks: 0,
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.buffer.is_some()
    }

    /// Audio-start marker.
    pub fn start(&mut self) -> AssemblerOutput {
        if let Some(buf) = &self.buffer {
            if !buf.is_empty() {
                warn!(
                    bytes = buf.len(),
                    "response started while one was open; keeping buffered audio"
                );
            }
            return AssemblerOutput::Ignored;
        }
        self.buffer = Some(BytesMut::new());
        self.chunks = 0;
        AssemblerOutput::Opened
    }

    pub fn push(&mut self, chunk: &Bytes) -> AssemblerOutput {
        let Some(buf) = self.buffer.as_mut() else {
            debug!(bytes = chunk.len(), "audio chunk outside a response; dropping");
            return AssemblerOutput::Stray;
        };
        buf.extend_from_slice(chunk);
        self.chunks += 1;
        AssemblerOutput::Buffered
    }

    /// Audio-end marker: emit the concatenated segment.
    pub fn finish(&mut self) -> AssemblerOutput {
        let Some(buf) = self.buffer.take() else {
            return AssemblerOutput::Ignored;
        };
        if buf.is_empty() {
            return AssemblerOutput::Empty;
        }
        let segment = PlaybackSegment::new(self.next_id, buf.freeze(), self.codec);
        self.next_id += 1;
        debug!(id = segment.id, chunks = self.chunks, bytes = segment.bytes.len(), "segment assembled");
        self.chunks = 0;
        AssemblerOutput::Segment(segment)
    }

    /// Drop any partially received response.
    pub fn reset(&mut self) {
        self.buffer = None;
        self.chunks = 0;
    }
}
