//! Agent audio playback.
//!
//! Segments are played strictly in arrival order on a dedicated worker
//! thread, one at a time. A segment that fails to decode or play is skipped
//! and the next one starts. When the queue runs dry the worker reports
//! `PlaybackEvent::Drained`.

pub mod assembler;
pub mod decode;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::{MockviewError, Result};

pub use assembler::{AssemblerOutput, SegmentAssembler};
pub use decode::{decode, estimate_duration, AudioCodec, DecodedAudio};

/// One complete agent utterance waiting to be played.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSegment {
    pub id: u64,
    pub bytes: Bytes,
    pub codec: AudioCodec,
}

impl PlaybackSegment {
    pub fn new(id: u64, bytes: Bytes, codec: AudioCodec) -> Self {
        Self { id, bytes, codec }
    }

    pub fn estimated_duration(&self) -> Duration {
        estimate_duration(&self.bytes, self.codec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    SegmentStarted { id: u64 },
    SegmentFinished { id: u64 },
    SegmentSkipped { id: u64, reason: String },
    /// The last queued segment has been played or skipped.
    Drained,
}

/// Blocking audio output used by the playback worker.
pub trait AudioSink: Send + 'static {
    /// Play `audio` to completion, returning early once `stop` is set.
    fn play(&mut self, audio: &DecodedAudio, stop: &AtomicBool) -> Result<()>;
}

/// A sink that records what it was asked to play and returns immediately.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    played: Arc<Mutex<Vec<DecodedAudio>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Arc<Mutex<Vec<DecodedAudio>>> {
        Arc::clone(&self.played)
    }
}

impl AudioSink for MemorySink {
    fn play(&mut self, audio: &DecodedAudio, _stop: &AtomicBool) -> Result<()> {
        self.played.lock().push(audio.clone());
        Ok(())
    }
}

enum Command {
    Play(PlaybackSegment),
    Shutdown,
}

pub struct PlaybackQueue {
    commands: Sender<Command>,
    pending: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PlaybackQueue {
    /// Spawn the playback worker around `sink`.
    pub fn start<S: AudioSink>(sink: S, events: UnboundedSender<PlaybackEvent>) -> Result<Self> {
        let (tx, rx) = unbounded();
        let pending = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let worker = std::thread::Builder::new()
            .name("mockview-playback".into())
            .spawn({
                let pending = Arc::clone(&pending);
                let stop = Arc::clone(&stop);
                move || run_worker(sink, rx, events, pending, stop)
            })
            .map_err(MockviewError::Io)?;

        Ok(Self {
            commands: tx,
            pending,
            stop,
            worker: Some(worker),
        })
    }

    /// Queue a segment behind everything already queued.
    pub fn enqueue(&self, segment: PlaybackSegment) -> Result<()> {
        if self.worker.is_none() {
            return Err(MockviewError::NotRunning);
        }
        debug!(id = segment.id, bytes = segment.bytes.len(), "segment queued");
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.commands.send(Command::Play(segment)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            MockviewError::NotRunning
        })
    }

    /// Segments queued or playing.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stop the current segment, discard the rest, and join the worker.
    /// Safe to call more than once.
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
        if worker.join().is_err() {
            warn!("playback worker panicked");
        }
        info!("playback stopped");
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker<S: AudioSink>(
    mut sink: S,
    commands: Receiver<Command>,
    events: UnboundedSender<PlaybackEvent>,
    pending: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
) {
    while let Ok(command) = commands.recv() {
        let segment = match command {
            Command::Play(segment) => segment,
            Command::Shutdown => break,
        };
        if stop.load(Ordering::Acquire) {
            break;
        }

        let id = segment.id;
        let outcome = decode(&segment.bytes, segment.codec).and_then(|audio| {
            let _ = events.send(PlaybackEvent::SegmentStarted { id });
            sink.play(&audio, &stop)
        });
        let event = match outcome {
            Ok(()) => PlaybackEvent::SegmentFinished { id },
            Err(e) => {
                warn!(id, error = %e, "skipping playback segment");
                PlaybackEvent::SegmentSkipped {
                    id,
                    reason: e.to_string(),
                }
            }
        };
        let _ = events.send(event);

        if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _ = events.send(PlaybackEvent::Drained);
        }
    }
    debug!("playback worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn pcm(value: i16, samples: usize) -> Bytes {
        Bytes::from(
            std::iter::repeat(value.to_le_bytes())
                .take(samples)
                .flatten()
                .collect::<Vec<u8>>(),
        )
    }

    /// Collect events until `segments` segments have finished or been
    /// skipped, plus the `Drained` that must follow the last one. Earlier
    /// `Drained` events (the worker can outrun the producer) are dropped.
    async fn collect_segments(
        rx: &mut mpsc::UnboundedReceiver<PlaybackEvent>,
        segments: usize,
    ) -> Vec<PlaybackEvent> {
        let mut out = Vec::new();
        let mut done = 0;
        while let Some(ev) = rx.recv().await {
            match ev {
                PlaybackEvent::Drained if done < segments => continue,
                PlaybackEvent::Drained => {
                    out.push(ev);
                    break;
                }
                PlaybackEvent::SegmentFinished { .. } | PlaybackEvent::SegmentSkipped { .. } => {
                    done += 1;
                    out.push(ev);
                }
                PlaybackEvent::SegmentStarted { .. } => out.push(ev),
            }
        }
        out
    }

    #[tokio::test]
    async fn plays_in_order_and_skips_undecodable() {
        let sink = MemorySink::new();
        let played = sink.played();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut queue = PlaybackQueue::start(sink, tx).unwrap();

        let codec = AudioCodec::default();
        queue.enqueue(PlaybackSegment::new(1, pcm(100, 160), codec)).unwrap();
        queue.enqueue(PlaybackSegment::new(2, Bytes::from_static(&[1, 2, 3]), codec)).unwrap();
        queue.enqueue(PlaybackSegment::new(3, pcm(300, 160), codec)).unwrap();

        let events = collect_segments(&mut rx, 3).await;
        assert!(matches!(events[0], PlaybackEvent::SegmentStarted { id: 1 }));
        assert!(matches!(events[1], PlaybackEvent::SegmentFinished { id: 1 }));
        assert!(matches!(events[2], PlaybackEvent::SegmentSkipped { id: 2, .. }));
        assert!(matches!(events[3], PlaybackEvent::SegmentStarted { id: 3 }));
        assert!(matches!(events[4], PlaybackEvent::SegmentFinished { id: 3 }));
        assert_eq!(events[5], PlaybackEvent::Drained);
        assert_eq!(events.len(), 6);

        let played = played.lock();
        assert_eq!(played.len(), 2);
        assert_eq!(played[0].samples[0], 100.0 / 32768.0);
        assert_eq!(played[1].samples[0], 300.0 / 32768.0);
        drop(played);

        assert_eq!(queue.pending(), 0);
        queue.shutdown();
        queue.shutdown();
        assert!(queue.enqueue(PlaybackSegment::new(4, pcm(1, 2), codec)).is_err());
    }

    #[tokio::test]
    async fn single_skipped_segment_still_drains() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut queue = PlaybackQueue::start(MemorySink::new(), tx).unwrap();
        queue
            .enqueue(PlaybackSegment::new(9, Bytes::from_static(b"bad"), AudioCodec::Wav))
            .unwrap();
        let events = collect_segments(&mut rx, 1).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events.last(), Some(&PlaybackEvent::Drained));
        queue.shutdown();
    }

    struct SlowSink {
        playing: Arc<AtomicBool>,
        overlaps: Arc<AtomicUsize>,
    }

    impl AudioSink for SlowSink {
        fn play(&mut self, _audio: &DecodedAudio, _stop: &AtomicBool) -> Result<()> {
            if self.playing.swap(true, Ordering::AcqRel) {
                self.overlaps.fetch_add(1, Ordering::AcqRel);
            }
            std::thread::sleep(Duration::from_millis(5));
            self.playing.store(false, Ordering::Release);
            Ok(())
        }
    }

    #[tokio::test]
    async fn segments_never_overlap() {
        let overlaps = Arc::new(AtomicUsize::new(0));
        let sink = SlowSink {
            playing: Arc::new(AtomicBool::new(false)),
            overlaps: Arc::clone(&overlaps),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut queue = PlaybackQueue::start(sink, tx).unwrap();
        for id in 0..5 {
            queue
                .enqueue(PlaybackSegment::new(id, pcm(10, 16), AudioCodec::default()))
                .unwrap();
        }
        let events = collect_segments(&mut rx, 5).await;
        let finished: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::SegmentFinished { id } => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(finished, vec![0, 1, 2, 3, 4]);
        assert_eq!(overlaps.load(Ordering::Acquire), 0);
        queue.shutdown();
    }
}
