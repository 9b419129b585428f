//! # Lancast Wire
//!
//! Encoding and decoding of the two lancast wire structures:
//!
//! - [`Announcement`] - the UDP broadcast datagram peers use to announce
//!   their presence (HELLO) and departure (GOODBYE)
//! - [`TransferHeader`] - the header written at the start of every TCP
//!   transfer connection, describing the payload that follows
//!
//! This crate is pure data transformation: it never touches a socket or the
//! filesystem. All multi-byte fields are big-endian (network byte order) and
//! every structure opens with the 4-byte protocol marker [`MARKER`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod announce;
pub mod error;
pub mod header;

pub use announce::{Announcement, AnnouncementKind};
pub use error::WireError;
pub use header::{FileEntry, TransferHeader, HEADER_PRELUDE_LEN};

/// Protocol marker opening every datagram and transfer header
pub const MARKER: [u8; 4] = *b"LCP1";

/// Upper bound on a transfer header body, to keep decode buffering sane.
///
/// The payload itself is unbounded; this only limits the header (file list).
pub const MAX_HEADER_BODY: usize = 16 * 1024 * 1024;

/// Cursor over a decode buffer with bounds-checked big-endian reads.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.pos + n > self.buf.len() {
            return Err(WireError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, WireError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub(crate) fn read_marker(&mut self) -> Result<(), WireError> {
        let b = self.take(MARKER.len())?;
        if b != MARKER {
            return Err(WireError::BadMarker);
        }
        Ok(())
    }

    pub(crate) fn read_str(&mut self, len: usize) -> Result<&'a str, WireError> {
        let b = self.take(len)?;
        std::str::from_utf8(b).map_err(|_| WireError::InvalidUtf8)
    }
}
