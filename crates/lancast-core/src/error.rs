//! Error types for the lancast engine.
//!
//! The taxonomy separates failures by blast radius:
//!
//! - per-datagram ([`EngineError::MalformedDatagram`]) - dropped, the
//!   discovery loop keeps running
//! - per-transfer ([`EngineError::Connect`], [`EngineError::TransferIo`],
//!   [`EngineError::Aborted`]) - end one session, the listeners are untouched
//! - per-subsystem ([`EngineError::Bind`]) - fatal to discovery or to the
//!   inbound listener for the process lifetime, reported once

use lancast_wire::WireError;
use thiserror::Error;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A discovery datagram failed to decode; dropped, never fatal
    #[error("malformed discovery datagram: {0}")]
    MalformedDatagram(#[from] WireError),

    /// User-supplied destination string is unusable; fails before any I/O
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// The transfer connection could not be established
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Mid-stream read/write failure on an active transfer
    #[error("transfer I/O error: {0}")]
    TransferIo(#[source] std::io::Error),

    /// The user aborted the transfer; distinct from a fault
    #[error("transfer aborted by user")]
    Aborted,

    /// A required socket could not be bound at startup
    #[error("failed to bind socket: {0}")]
    Bind(#[source] std::io::Error),

    /// Operation not valid in the engine's current state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl EngineError {
    /// True if this error ends a single session without affecting the
    /// standing listeners.
    #[must_use]
    pub fn is_session_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidDestination(_) | Self::Connect(_) | Self::TransferIo(_) | Self::Aborted
        )
    }

    /// True if this error is fatal to the subsystem that reported it.
    #[must_use]
    pub fn is_subsystem_fatal(&self) -> bool {
        matches!(self, Self::Bind(_))
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
