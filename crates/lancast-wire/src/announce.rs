//! Discovery datagram encoding and decoding.
//!
//! Wire layout (big-endian):
//!
//! ```text
//! marker   [4]       b"LCP1"
//! kind     u8        0x01 HELLO | 0x02 GOODBYE
//! port     u16       sender's transfer (TCP) port
//! name     u16 + n   length-prefixed UTF-8 display name
//! platform u8  + n   length-prefixed UTF-8 platform tag
//! ```

use crate::error::WireError;
use crate::{Reader, MARKER};

/// Discovery message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AnnouncementKind {
    /// Peer is present (sent at startup, periodically, and on resume)
    Hello = 0x01,
    /// Peer is leaving (sent once at shutdown)
    Goodbye = 0x02,
}

impl TryFrom<u8> for AnnouncementKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Hello),
            0x02 => Ok(Self::Goodbye),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

/// A decoded discovery datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// HELLO or GOODBYE
    pub kind: AnnouncementKind,
    /// Sender's display name
    pub name: String,
    /// Sender's platform tag (e.g. "linux", "macos")
    pub platform: String,
    /// TCP port the sender accepts transfers on
    pub port: u16,
}

impl Announcement {
    /// Build a HELLO announcement.
    pub fn hello(name: impl Into<String>, platform: impl Into<String>, port: u16) -> Self {
        Self {
            kind: AnnouncementKind::Hello,
            name: name.into(),
            platform: platform.into(),
            port,
        }
    }

    /// Build a GOODBYE announcement.
    pub fn goodbye(name: impl Into<String>, platform: impl Into<String>, port: u16) -> Self {
        Self {
            kind: AnnouncementKind::Goodbye,
            name: name.into(),
            platform: platform.into(),
            port,
        }
    }

    /// Encode into a datagram buffer.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::FieldTooLong`] if the name exceeds `u16::MAX`
    /// bytes or the platform tag exceeds `u8::MAX` bytes.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let name = self.name.as_bytes();
        let platform = self.platform.as_bytes();
        if name.len() > u16::MAX as usize {
            return Err(WireError::FieldTooLong("name"));
        }
        if platform.len() > u8::MAX as usize {
            return Err(WireError::FieldTooLong("platform"));
        }

        let mut buf = Vec::with_capacity(4 + 1 + 2 + 2 + name.len() + 1 + platform.len());
        buf.extend_from_slice(&MARKER);
        buf.push(self.kind as u8);
        buf.extend_from_slice(&self.port.to_be_bytes());
        buf.extend_from_slice(&(name.len() as u16).to_be_bytes());
        buf.extend_from_slice(name);
        buf.push(platform.len() as u8);
        buf.extend_from_slice(platform);
        Ok(buf)
    }

    /// Decode a datagram.
    ///
    /// Trailing bytes after the structure are tolerated (future versions may
    /// append fields).
    ///
    /// # Errors
    ///
    /// [`WireError::BadMarker`] or [`WireError::UnknownKind`] for datagrams
    /// from foreign protocols, [`WireError::Truncated`] /
    /// [`WireError::InvalidUtf8`] for damaged ones. Callers drop all of
    /// these silently.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(buf);
        r.read_marker()?;
        let kind = AnnouncementKind::try_from(r.read_u8()?)?;
        let port = r.read_u16()?;
        let name_len = r.read_u16()? as usize;
        let name = r.read_str(name_len)?.to_owned();
        let platform_len = r.read_u8()? as usize;
        let platform = r.read_str(platform_len)?.to_owned();
        Ok(Self {
            kind,
            name,
            platform,
            port,
        })
    }
}
