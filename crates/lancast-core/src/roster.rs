//! The peer roster: an in-memory table of hosts currently on the network.
//!
//! The sole writer is the discovery read loop; everything else takes owned
//! snapshots. A peer is keyed by its address, listed in insertion order for
//! stable UI presentation, and leaves the roster only through an explicit
//! GOODBYE (there is no liveness aging).

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::RwLock;

/// A remote host discovered via broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Network address, unique key in the roster
    pub addr: IpAddr,
    /// Display name from the peer's last HELLO
    pub name: String,
    /// Platform tag from the peer's last HELLO
    pub platform: String,
    /// TCP port the peer accepts transfers on
    pub port: u16,
}

impl Peer {
    /// Create a peer record.
    pub fn new(addr: IpAddr, name: impl Into<String>, platform: impl Into<String>, port: u16) -> Self {
        Self {
            addr,
            name: name.into(),
            platform: platform.into(),
            port,
        }
    }
}

#[derive(Default)]
struct RosterInner {
    peers: HashMap<IpAddr, Peer>,
    // Insertion order of addresses currently present
    order: Vec<IpAddr>,
}

/// Insertion-ordered table of known peers.
///
/// All operations are synchronous in-memory map operations; none blocks on
/// I/O. The lock is held only for the duration of one operation.
#[derive(Default)]
pub struct PeerRoster {
    inner: RwLock<RosterInner>,
}

impl PeerRoster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a peer by address.
    ///
    /// Returns `true` if the address was not present before. An update keeps
    /// the peer's position in the listing order.
    pub fn upsert(&self, peer: Peer) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let is_new = !inner.peers.contains_key(&peer.addr);
        if is_new {
            inner.order.push(peer.addr);
        }
        inner.peers.insert(peer.addr, peer);
        is_new
    }

    /// Remove a peer, returning it if it was present.
    pub fn remove(&self, addr: &IpAddr) -> Option<Peer> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let removed = inner.peers.remove(addr);
        if removed.is_some() {
            inner.order.retain(|a| a != addr);
        }
        removed
    }

    /// Look up a peer by address.
    pub fn lookup(&self, addr: &IpAddr) -> Option<Peer> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.peers.get(addr).cloned()
    }

    /// Snapshot of all peers in insertion order.
    pub fn list(&self) -> Vec<Peer> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner
            .order
            .iter()
            .filter_map(|addr| inner.peers.get(addr).cloned())
            .collect()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.peers.len()
    }

    /// True if no peers are known.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
