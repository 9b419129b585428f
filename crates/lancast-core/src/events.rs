//! Engine events and the sink they are published through.
//!
//! The engine knows nothing about its presentation layer: every observable
//! state change is a variant of [`EngineEvent`] pushed through an
//! [`EventSink`]. Events for one session are delivered in issuing order and
//! each session ends in exactly one terminal event; no ordering is promised
//! across unrelated sessions.

use crate::roster::Peer;
use std::net::IpAddr;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Handle addressing one active transfer session.
pub type SessionId = u64;

/// Events published by the discovery listener and the transfer engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A new peer appeared on the network
    PeerAdded(Peer),

    /// A peer said goodbye
    PeerRemoved(Peer),

    /// An inbound file transfer started
    ReceiveStart {
        /// Session the following events belong to
        session: SessionId,
        /// Address of the sending host
        sender: IpAddr,
    },

    /// Bytes moved on an active session (either direction)
    Progress {
        /// Session this progress belongs to
        session: SessionId,
        /// Aggregate payload size, constant for the session
        total: u64,
        /// Running byte count, monotonically non-decreasing
        transferred: u64,
    },

    /// Terminal: an inbound file set arrived completely
    ReceiveFilesComplete {
        /// Session that finished
        session: SessionId,
        /// Paths created on disk, in stream order
        paths: Vec<PathBuf>,
        /// Total bytes received
        total: u64,
    },

    /// Terminal: an inbound text snippet arrived completely
    ReceiveTextComplete {
        /// Session that finished
        session: SessionId,
        /// The snippet
        text: String,
        /// Its byte count
        size: u64,
    },

    /// Terminal: an outbound transfer delivered every byte
    SendComplete {
        /// Session that finished
        session: SessionId,
        /// Source paths that were sent
        paths: Vec<PathBuf>,
    },

    /// Terminal: an outbound transfer failed
    SendFailed {
        /// Session that failed
        session: SessionId,
        /// Display form of the underlying transport/filesystem error
        error: String,
    },

    /// Terminal: the user aborted an outbound transfer
    SendAborted {
        /// Session that was aborted
        session: SessionId,
    },

    /// Terminal: an inbound transfer was cut short; partial files stay on
    /// disk as-is
    ReceiveCancelled {
        /// Session that was cancelled
        session: SessionId,
    },
}

impl EngineEvent {
    /// True if this event ends its session.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ReceiveFilesComplete { .. }
                | Self::ReceiveTextComplete { .. }
                | Self::SendComplete { .. }
                | Self::SendFailed { .. }
                | Self::SendAborted { .. }
                | Self::ReceiveCancelled { .. }
        )
    }

    /// Session this event belongs to, if any.
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        match self {
            Self::PeerAdded(_) | Self::PeerRemoved(_) => None,
            Self::ReceiveStart { session, .. }
            | Self::Progress { session, .. }
            | Self::ReceiveFilesComplete { session, .. }
            | Self::ReceiveTextComplete { session, .. }
            | Self::SendComplete { session, .. }
            | Self::SendFailed { session, .. }
            | Self::SendAborted { session }
            | Self::ReceiveCancelled { session } => Some(*session),
        }
    }
}

/// Cloneable publishing side of the event channel.
///
/// Publishing never fails: if the consumer went away the event is dropped,
/// the engine keeps running.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    /// Create a sink and the receiver the presentation layer consumes.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Publish one event.
    pub fn publish(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(EngineEvent::SendAborted { session: 1 }.is_terminal());
        assert!(EngineEvent::ReceiveCancelled { session: 1 }.is_terminal());
        assert!(!EngineEvent::Progress {
            session: 1,
            total: 10,
            transferred: 5
        }
        .is_terminal());
        assert!(
            !EngineEvent::PeerAdded(Peer::new("10.0.0.1".parse().unwrap(), "a", "linux", 1))
                .is_terminal()
        );
    }

    #[test]
    fn session_accessor() {
        let ev = EngineEvent::SendComplete {
            session: 7,
            paths: vec![],
        };
        assert_eq!(ev.session(), Some(7));
        let ev = EngineEvent::PeerRemoved(Peer::new("10.0.0.1".parse().unwrap(), "a", "linux", 1));
        assert_eq!(ev.session(), None);
    }

    #[tokio::test]
    async fn publish_after_receiver_drop_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.publish(EngineEvent::SendAborted { session: 1 });
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        for transferred in [10u64, 20, 30] {
            sink.publish(EngineEvent::Progress {
                session: 1,
                total: 30,
                transferred,
            });
        }
        let mut seen = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if let EngineEvent::Progress { transferred, .. } = ev {
                seen.push(transferred);
            }
        }
        assert_eq!(seen, vec![10, 20, 30]);
    }
}
