//! Transfer destinations.
//!
//! A send goes either to a peer picked from the roster (stored address and
//! transfer port) or to a free-form `host[:port]` string typed by the user.
//! String parsing happens before any connection attempt; a malformed string
//! is [`EngineError::InvalidDestination`], surfaced to the caller untouched.

use crate::error::{EngineError, Result};
use crate::roster::Peer;

/// Where a send is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Hostname or IP address literal
    pub host: String,
    /// Transfer port to connect to
    pub port: u16,
}

impl Destination {
    /// Destination for a known peer: its stored address and transfer port.
    #[must_use]
    pub fn from_peer(peer: &Peer) -> Self {
        Self {
            host: peer.addr.to_string(),
            port: peer.port,
        }
    }

    /// Parse a user-supplied `host[:port]` string.
    ///
    /// A port suffix overrides `default_port`. The split is on the last `:`,
    /// so bare hostnames and IPv4 literals work; bracketed IPv6 literals are
    /// not supported.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidDestination`] for an empty host, an empty or
    /// non-numeric port, or a port outside `1..=65535`.
    pub fn parse(input: &str, default_port: u16) -> Result<Self> {
        let input = input.trim();

        let (host, port) = match input.rsplit_once(':') {
            Some((host, port_str)) => {
                let port: u16 = port_str
                    .parse()
                    .map_err(|_| invalid(input, "port is not a number"))?;
                if port == 0 {
                    return Err(invalid(input, "port must be non-zero"));
                }
                (host, port)
            }
            None => (input, default_port),
        };

        if host.is_empty() {
            return Err(invalid(input, "empty host"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// `host:port` form handed to the connector.
    #[must_use]
    pub fn authority(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

fn invalid(input: &str, why: &str) -> EngineError {
    EngineError::InvalidDestination(format!("{input:?}: {why}"))
}
