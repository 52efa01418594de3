//! In-memory transport that records outbound frames.
//!
//! Used by tests to run a full session without a network connection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{OutboundFrame, RelayTransport};
use crate::error::{MockviewError, Result};

#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    ready: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<OutboundFrame>>>,
    closes: Arc<AtomicUsize>,
}

impl LoopbackTransport {
    /// A transport that is not yet ready.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that accepts sends immediately.
    pub fn ready() -> Self {
        let t = Self::default();
        t.ready.store(true, Ordering::Release);
        t
    }

    /// Shared view of everything sent so far.
    pub fn sent(&self) -> Arc<Mutex<Vec<OutboundFrame>>> {
        Arc::clone(&self.sent)
    }

    /// Shared readiness flag, for simulating the handshake completing.
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::Acquire)
    }
}

impl RelayTransport for LoopbackTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        if !self.is_ready() {
            return Err(MockviewError::ConnectionUnavailable(
                "loopback transport not ready".into(),
            ));
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    fn close(&mut self) {
        self.ready.store(false, Ordering::Release);
        self.closes.fetch_add(1, Ordering::AcqRel);
    }
}
