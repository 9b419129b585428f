//! Transfer header encoding and decoding.
//!
//! Every TCP transfer connection starts with one header describing the
//! payload that follows; the raw payload bytes are streamed immediately after
//! it with no further framing. Wire layout (big-endian):
//!
//! ```text
//! marker [4]   b"LCP1"
//! kind   u8    0x01 FILES | 0x02 TEXT
//! body   u32   byte length of the remaining header body
//!
//! FILES body:  count u32, total u64,
//!              then per entry { path u16 + n UTF-8, size u64 }
//! TEXT body:   length u64 (UTF-8 byte count of the snippet)
//! ```
//!
//! The fixed 9-byte prelude lets a receiver read exactly one header off a
//! stream: read [`HEADER_PRELUDE_LEN`] bytes, ask [`body_len`] how much is
//! left, read that, then [`TransferHeader::decode`] the whole buffer.
//!
//! A declared entry or text *size* is never a decode error, however large;
//! it becomes the streaming bound for the payload that follows. Only the
//! header body itself is bounded (by [`crate::MAX_HEADER_BODY`]).

use crate::error::WireError;
use crate::{Reader, MARKER, MAX_HEADER_BODY};

/// Fixed prelude length: marker + kind + body length word.
pub const HEADER_PRELUDE_LEN: usize = 9;

const KIND_FILES: u8 = 0x01;
const KIND_TEXT: u8 = 0x02;

/// One file entry in a FILES header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the receiver's destination folder, `/`-separated
    pub path: String,
    /// Exact byte count streamed for this entry
    pub size: u64,
}

impl FileEntry {
    /// Create an entry.
    pub fn new(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }
}

/// A decoded transfer header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferHeader {
    /// An ordered file set; raw bytes follow per entry in the same order.
    Files {
        /// Entries in stream order
        entries: Vec<FileEntry>,
        /// Aggregate payload size, fixed before any byte is sent
        total: u64,
    },
    /// A text snippet; `length` UTF-8 bytes follow.
    Text {
        /// Byte count of the snippet
        length: u64,
    },
}

impl TransferHeader {
    /// Build a FILES header; `total` is computed from the entries.
    pub fn files(entries: Vec<FileEntry>) -> Self {
        let total = entries.iter().map(|e| e.size).sum();
        Self::Files { entries, total }
    }

    /// Build a TEXT header for a snippet of `length` bytes.
    pub fn text(length: u64) -> Self {
        Self::Text { length }
    }

    /// Aggregate payload size announced by this header.
    pub fn total_size(&self) -> u64 {
        match self {
            Self::Files { total, .. } => *total,
            Self::Text { length } => *length,
        }
    }

    /// Encode into a buffer ready to be written ahead of the payload.
    ///
    /// # Errors
    ///
    /// [`WireError::FieldTooLong`] if an entry path exceeds `u16::MAX`
    /// bytes, [`WireError::OversizedHeader`] if the file list does not fit
    /// the header bound.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut body = Vec::new();
        let kind = match self {
            Self::Files { entries, total } => {
                body.extend_from_slice(&(entries.len() as u32).to_be_bytes());
                body.extend_from_slice(&total.to_be_bytes());
                for entry in entries {
                    let path = entry.path.as_bytes();
                    if path.len() > u16::MAX as usize {
                        return Err(WireError::FieldTooLong("entry path"));
                    }
                    body.extend_from_slice(&(path.len() as u16).to_be_bytes());
                    body.extend_from_slice(path);
                    body.extend_from_slice(&entry.size.to_be_bytes());
                }
                KIND_FILES
            }
            Self::Text { length } => {
                body.extend_from_slice(&length.to_be_bytes());
                KIND_TEXT
            }
        };

        if body.len() > MAX_HEADER_BODY {
            return Err(WireError::OversizedHeader(body.len() as u64));
        }

        let mut buf = Vec::with_capacity(HEADER_PRELUDE_LEN + body.len());
        buf.extend_from_slice(&MARKER);
        buf.push(kind);
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    /// Decode a complete header (prelude + body).
    ///
    /// Returns the header and the number of bytes consumed; payload bytes
    /// start right after. Trailing bytes are left untouched.
    ///
    /// # Errors
    ///
    /// Any [`WireError`] variant describing why the buffer is not a valid
    /// header.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), WireError> {
        let mut r = Reader::new(buf);
        r.read_marker()?;
        let kind = r.read_u8()?;
        let body_len = r.read_u32()? as usize;
        if body_len > MAX_HEADER_BODY {
            return Err(WireError::OversizedHeader(body_len as u64));
        }
        let body_end = HEADER_PRELUDE_LEN + body_len;
        if buf.len() < body_end {
            return Err(WireError::Truncated);
        }

        let header = match kind {
            KIND_FILES => {
                let count = r.read_u32()? as usize;
                let total = r.read_u64()?;
                let mut entries = Vec::with_capacity(count.min(4096));
                for _ in 0..count {
                    let path_len = r.read_u16()? as usize;
                    let path = r.read_str(path_len)?.to_owned();
                    let size = r.read_u64()?;
                    entries.push(FileEntry { path, size });
                }
                Self::Files { entries, total }
            }
            KIND_TEXT => Self::Text {
                length: r.read_u64()?,
            },
            other => return Err(WireError::UnknownKind(other)),
        };

        if r.position() != body_end {
            return Err(WireError::Inconsistent("body length mismatch"));
        }
        Ok((header, body_end))
    }
}

/// Validate a header prelude and return the body length that follows it.
///
/// # Errors
///
/// [`WireError::Truncated`] if fewer than [`HEADER_PRELUDE_LEN`] bytes,
/// [`WireError::BadMarker`] / [`WireError::UnknownKind`] for foreign data,
/// [`WireError::OversizedHeader`] past the buffering bound.
pub fn body_len(prelude: &[u8]) -> Result<usize, WireError> {
    let mut r = Reader::new(prelude);
    r.read_marker()?;
    let kind = r.read_u8()?;
    if kind != KIND_FILES && kind != KIND_TEXT {
        return Err(WireError::UnknownKind(kind));
    }
    let len = r.read_u32()? as usize;
    if len > MAX_HEADER_BODY {
        return Err(WireError::OversizedHeader(len as u64));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_roundtrip() {
        let header = TransferHeader::files(vec![
            FileEntry::new("notes.txt", 120),
            FileEntry::new("photos/cat.jpg", 40_960),
        ]);
        let buf = header.encode().unwrap();
        let (decoded, consumed) = TransferHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.total_size(), 41_080);
    }

    #[test]
    fn text_roundtrip() {
        let header = TransferHeader::text(42);
        let buf = header.encode().unwrap();
        let (decoded, consumed) = TransferHeader::decode(&buf).unwrap();
        assert_eq!(decoded, TransferHeader::Text { length: 42 });
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn empty_file_set() {
        let header = TransferHeader::files(vec![]);
        let (decoded, _) = TransferHeader::decode(&header.encode().unwrap()).unwrap();
        assert_eq!(decoded.total_size(), 0);
    }

    #[test]
    fn huge_declared_size_is_not_a_decode_error() {
        let header = TransferHeader::files(vec![FileEntry::new("big.bin", u64::MAX / 2)]);
        let buf = header.encode().unwrap();
        let (decoded, _) = TransferHeader::decode(&buf).unwrap();
        assert_eq!(decoded.total_size(), u64::MAX / 2);
    }

    #[test]
    fn payload_bytes_after_header_are_untouched() {
        let header = TransferHeader::text(5);
        let mut buf = header.encode().unwrap();
        let header_len = buf.len();
        buf.extend_from_slice(b"hello");
        let (_, consumed) = TransferHeader::decode(&buf).unwrap();
        assert_eq!(consumed, header_len);
        assert_eq!(&buf[consumed..], b"hello");
    }

    #[test]
    fn rejects_unknown_kind() {
        let mut buf = TransferHeader::text(1).encode().unwrap();
        buf[4] = 0x66;
        assert_eq!(
            TransferHeader::decode(&buf),
            Err(WireError::UnknownKind(0x66))
        );
    }

    #[test]
    fn rejects_truncated_body() {
        let buf = TransferHeader::files(vec![FileEntry::new("a", 1)])
            .encode()
            .unwrap();
        assert_eq!(
            TransferHeader::decode(&buf[..buf.len() - 1]),
            Err(WireError::Truncated)
        );
    }

    #[test]
    fn rejects_oversized_header_body() {
        let mut buf = TransferHeader::text(1).encode().unwrap();
        buf[5..9].copy_from_slice(&(MAX_HEADER_BODY as u32 + 1).to_be_bytes());
        assert!(matches!(
            TransferHeader::decode(&buf),
            Err(WireError::OversizedHeader(_))
        ));
    }

    #[test]
    fn prelude_body_len() {
        let buf = TransferHeader::text(7).encode().unwrap();
        assert_eq!(body_len(&buf[..HEADER_PRELUDE_LEN]).unwrap(), 8);
        assert_eq!(body_len(&buf[..4]), Err(WireError::Truncated));
    }

    #[test]
    fn body_length_mismatch_detected() {
        let mut buf = TransferHeader::text(7).encode().unwrap();
        // Claim a body one byte longer than the TEXT body actually is
        buf[5..9].copy_from_slice(&9u32.to_be_bytes());
        buf.push(0);
        assert_eq!(
            TransferHeader::decode(&buf),
            Err(WireError::Inconsistent("body length mismatch"))
        );
    }
}
