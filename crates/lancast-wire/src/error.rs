//! Codec error types.

use thiserror::Error;

/// Errors produced while encoding or decoding wire structures.
///
/// Decode errors on discovery datagrams are non-fatal by contract: the
/// listener drops the datagram and keeps reading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer does not open with the protocol marker
    #[error("missing or wrong protocol marker")]
    BadMarker,

    /// Message kind byte is not one this version understands
    #[error("unknown message kind: {0:#04x}")]
    UnknownKind(u8),

    /// Buffer ended before the structure was complete
    #[error("truncated message")]
    Truncated,

    /// A string field is not valid UTF-8
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    /// A string field exceeds its length prefix on encode
    #[error("field too long for wire format: {0}")]
    FieldTooLong(&'static str),

    /// Declared header body length exceeds the decode buffering bound
    #[error("header body of {0} bytes exceeds the decode limit")]
    OversizedHeader(u64),

    /// Entry count or sizes are internally inconsistent
    #[error("inconsistent header: {0}")]
    Inconsistent(&'static str),
}
