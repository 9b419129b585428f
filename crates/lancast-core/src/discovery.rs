//! Peer discovery over UDP broadcast.
//!
//! One broadcast-capable socket bound to the discovery port carries two
//! independent flows: outbound HELLO/GOODBYE announcements and an inbound
//! read loop that feeds the [`PeerRoster`]. The read loop runs for the
//! process lifetime; a datagram that fails to decode is dropped and logged
//! at debug, never fatal. Failure to bind the socket is fatal to discovery
//! only - transfers are unaffected.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink};
use crate::roster::{Peer, PeerRoster};
use lancast_wire::{Announcement, AnnouncementKind};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, RwLock};
use tokio::net::UdpSocket;

/// Local identity advertised in announcements.
///
/// The nickname is behind a lock so a rename takes effect on the very next
/// announce, periodic or triggered, with no restart.
#[derive(Debug)]
pub struct LocalIdentity {
    nickname: RwLock<String>,
    platform: String,
    transfer_port: u16,
}

impl LocalIdentity {
    /// Build from engine configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            nickname: RwLock::new(config.nickname.clone()),
            platform: config.platform.clone(),
            transfer_port: config.transfer_port,
        }
    }

    /// Current display name.
    pub fn nickname(&self) -> String {
        self.nickname.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Change the display name advertised from now on.
    pub fn set_nickname(&self, name: impl Into<String>) {
        *self.nickname.write().unwrap_or_else(|e| e.into_inner()) = name.into();
    }

    /// Platform tag.
    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Advertised transfer port.
    pub fn transfer_port(&self) -> u16 {
        self.transfer_port
    }

    fn announcement(&self, kind: AnnouncementKind) -> Announcement {
        Announcement {
            kind,
            name: self.nickname(),
            platform: self.platform.clone(),
            port: self.transfer_port,
        }
    }
}

/// Inbound datagram handling, separated from the socket so the roster logic
/// is testable without binding anything.
pub(crate) struct Intake {
    pub(crate) roster: Arc<PeerRoster>,
    pub(crate) sink: EventSink,
    /// Our own addresses; datagrams from these are ignored so the host does
    /// not list itself (the presentation layer has its own "self" entry)
    pub(crate) local_addrs: HashSet<IpAddr>,
}

impl Intake {
    /// Apply one datagram to the roster.
    ///
    /// # Errors
    ///
    /// [`EngineError::MalformedDatagram`] if the buffer does not decode;
    /// the caller logs and drops it.
    pub(crate) fn handle(&self, src: IpAddr, buf: &[u8]) -> Result<()> {
        let announcement = Announcement::decode(buf)?;
        if self.local_addrs.contains(&src) {
            return Ok(());
        }

        match announcement.kind {
            AnnouncementKind::Hello => {
                let peer = Peer::new(src, announcement.name, announcement.platform, announcement.port);
                if self.roster.upsert(peer.clone()) {
                    tracing::info!(peer = %src, name = %peer.name, "peer appeared");
                    self.sink.publish(EngineEvent::PeerAdded(peer));
                }
            }
            AnnouncementKind::Goodbye => {
                if let Some(peer) = self.roster.remove(&src) {
                    tracing::info!(peer = %src, name = %peer.name, "peer left");
                    self.sink.publish(EngineEvent::PeerRemoved(peer));
                }
            }
        }
        Ok(())
    }
}

/// The discovery subsystem: broadcast socket, announcer, read loop.
pub struct DiscoveryService {
    socket: Arc<UdpSocket>,
    broadcast_addr: SocketAddr,
    identity: Arc<LocalIdentity>,
    intake: Intake,
}

impl DiscoveryService {
    /// Bind the discovery socket and assemble the service.
    ///
    /// The socket is configured with `SO_REUSEADDR` and `SO_BROADCAST`
    /// before being handed to tokio.
    ///
    /// # Errors
    ///
    /// [`EngineError::Bind`] if the socket cannot be bound; fatal to
    /// discovery for the process lifetime.
    pub fn bind(
        discovery_port: u16,
        identity: Arc<LocalIdentity>,
        roster: Arc<PeerRoster>,
        sink: EventSink,
    ) -> Result<Self> {
        let socket = bind_broadcast_socket(discovery_port).map_err(EngineError::Bind)?;
        let broadcast_addr =
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, discovery_port));

        let mut local_addrs = local_addresses();
        local_addrs.insert(IpAddr::V4(Ipv4Addr::LOCALHOST));

        tracing::debug!(port = discovery_port, ?local_addrs, "discovery socket bound");

        Ok(Self {
            socket: Arc::new(socket),
            broadcast_addr,
            identity,
            intake: Intake {
                roster,
                sink,
                local_addrs,
            },
        })
    }

    /// Broadcast a HELLO announcing our presence.
    ///
    /// Called at startup, on the periodic cadence, and whenever the host
    /// application returns to the foreground.
    ///
    /// # Errors
    ///
    /// [`EngineError::TransferIo`] if the send fails.
    pub async fn announce_hello(&self) -> Result<()> {
        self.broadcast(AnnouncementKind::Hello).await
    }

    /// Broadcast a GOODBYE; called exactly once during shutdown.
    ///
    /// # Errors
    ///
    /// [`EngineError::TransferIo`] if the send fails.
    pub async fn announce_goodbye(&self) -> Result<()> {
        self.broadcast(AnnouncementKind::Goodbye).await
    }

    async fn broadcast(&self, kind: AnnouncementKind) -> Result<()> {
        let datagram = self
            .identity
            .announcement(kind)
            .encode()
            .map_err(EngineError::MalformedDatagram)?;
        self.socket
            .send_to(&datagram, self.broadcast_addr)
            .await
            .map_err(EngineError::TransferIo)?;
        tracing::debug!(?kind, "announcement broadcast");
        Ok(())
    }

    /// Run the inbound read loop until the socket errors fatally.
    ///
    /// Decode failures are per-datagram and never terminate the loop.
    pub async fn run(&self) {
        let mut buf = vec![0u8; 2048];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => {
                    if let Err(err) = self.intake.handle(src.ip(), &buf[..len]) {
                        tracing::debug!(%src, %err, "dropping datagram");
                    }
                }
                Err(err) => {
                    // recv errors on UDP are rare and usually transient
                    // (e.g. ICMP-induced); keep the listener alive
                    tracing::warn!(%err, "discovery recv error");
                }
            }
        }
    }
}

fn bind_broadcast_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

/// Best-effort enumeration of our own addresses, used to ignore our own
/// broadcasts. A connected UDP socket learns the primary outbound address
/// without sending a packet.
pub(crate) fn local_addresses() -> HashSet<IpAddr> {
    let mut addrs = HashSet::new();
    addrs.insert(IpAddr::V4(Ipv4Addr::LOCALHOST));
    if let Ok(probe) = std::net::UdpSocket::bind("0.0.0.0:0") {
        if probe.connect("198.51.100.1:9").is_ok() {
            if let Ok(local) = probe.local_addr() {
                addrs.insert(local.ip());
            }
        }
    }
    addrs
}
