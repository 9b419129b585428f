//! The transfer pipeline: outbound sends and inbound receives over TCP.
//!
//! Each transfer runs on its own spawned task and reports through the
//! [`EventSink`] under its own [`SessionId`]. Terminal events are emitted
//! exactly once per session by construction: the task body computes a
//! `Result` and a single match at the end turns it into the one terminal
//! event. Cancellation is cooperative - an abort flag checked at every
//! chunk boundary - so abort latency is bounded by one chunk of I/O.

pub(crate) mod recv;
pub(crate) mod send;

use crate::events::{EngineEvent, EventSink, SessionId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Streaming chunk size; also the abort-latency bound.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Per-session context shared by the send and receive state machines.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub(crate) id: SessionId,
    pub(crate) sink: EventSink,
    abort: Arc<AtomicBool>,
}

impl SessionContext {
    pub(crate) fn new(id: SessionId, sink: EventSink) -> Self {
        Self {
            id,
            sink,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancellation flag handed to the engine's session table.
    pub(crate) fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Observed at chunk boundaries.
    pub(crate) fn aborted(&self) -> bool {
        self.abort.load(Ordering::Relaxed)
    }

    pub(crate) fn progress(&self, total: u64, transferred: u64) {
        self.sink.publish(EngineEvent::Progress {
            session: self.id,
            total,
            transferred,
        });
    }
}
