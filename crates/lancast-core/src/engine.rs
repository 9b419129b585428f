//! Engine orchestration.
//!
//! The [`Engine`] is the entry point for applications: it owns the discovery
//! subsystem, the inbound transfer listener, and every outbound send, and
//! publishes everything observable through the event channel handed out at
//! construction. Cloning an `Engine` is cheap; all clones share one inner
//! state.

use crate::config::EngineConfig;
use crate::destination::Destination;
use crate::discovery::{DiscoveryService, LocalIdentity};
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink, SessionId};
use crate::payload::Payload;
use crate::roster::{Peer, PeerRoster};
use crate::transfer::{recv, send, SessionContext};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub(crate) struct EngineInner {
    config: EngineConfig,
    identity: Arc<LocalIdentity>,
    roster: Arc<PeerRoster>,
    sink: EventSink,
    /// Next session handle; sessions are never reused within a process
    next_session: AtomicU64,
    /// Abort flags of the sessions currently in flight
    active: DashMap<SessionId, Arc<AtomicBool>>,
    running: AtomicBool,
    discovery: Mutex<Option<Arc<DiscoveryService>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Actual transfer listener address, set by `start`
    transfer_addr: std::sync::Mutex<Option<SocketAddr>>,
}

/// The lancast protocol engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine and the event receiver for the presentation layer.
    ///
    /// Nothing is bound until [`Engine::start`].
    #[must_use]
    pub fn new(config: EngineConfig) -> (Self, UnboundedReceiver<EngineEvent>) {
        let (sink, rx) = EventSink::channel();
        let identity = Arc::new(LocalIdentity::new(&config));
        let inner = EngineInner {
            config,
            identity,
            roster: Arc::new(PeerRoster::new()),
            sink,
            next_session: AtomicU64::new(1),
            active: DashMap::new(),
            running: AtomicBool::new(false),
            discovery: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            transfer_addr: std::sync::Mutex::new(None),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Roster accessor; snapshots are taken per call.
    pub fn roster(&self) -> &PeerRoster {
        &self.inner.roster
    }

    /// Address the inbound transfer listener is actually bound to, once
    /// [`Engine::start`] has run. With a configured port of 0 this is where
    /// the OS-assigned port can be read back.
    pub fn transfer_addr(&self) -> Option<SocketAddr> {
        *self
            .inner
            .transfer_addr
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Our own addresses, for the presentation layer's address-info entry.
    pub fn local_addrs(&self) -> Vec<IpAddr> {
        let mut addrs: Vec<_> = crate::discovery::local_addresses().into_iter().collect();
        addrs.sort();
        addrs
    }

    // ───────────────────────────────────────────────────────────────────
    // Lifecycle
    // ───────────────────────────────────────────────────────────────────

    /// Bind the discovery and transfer sockets, start the standing loops,
    /// and broadcast the initial HELLO.
    ///
    /// Three long-lived tasks are spawned: the discovery read loop, the
    /// periodic announcer, and the inbound accept loop.
    ///
    /// # Errors
    ///
    /// [`EngineError::Bind`] if either socket cannot be bound, or
    /// [`EngineError::InvalidState`] if the engine is already running. A
    /// failed start leaves the engine stopped; `start` may be retried.
    pub async fn start(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::InvalidState("engine already running"));
        }

        match self.start_inner().await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Roll back so the engine is not wedged in "running"
                *self
                    .inner
                    .transfer_addr
                    .lock()
                    .unwrap_or_else(|e| e.into_inner()) = None;
                self.inner.running.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    async fn start_inner(&self) -> Result<()> {
        let config = &self.inner.config;
        tracing::info!(
            nickname = %self.inner.identity.nickname(),
            discovery_port = config.discovery_port,
            transfer_port = config.transfer_port,
            "starting engine"
        );

        // Inbound transfer listener first: its bind failure must not leave
        // a half-started discovery subsystem behind
        let listener = TcpListener::bind(SocketAddr::from((
            [0u8, 0, 0, 0],
            config.transfer_port,
        )))
        .await
        .map_err(EngineError::Bind)?;
        let bound = listener.local_addr().map_err(EngineError::Bind)?;
        *self
            .inner
            .transfer_addr
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(bound);

        let discovery = Arc::new(DiscoveryService::bind(
            config.discovery_port,
            Arc::clone(&self.inner.identity),
            Arc::clone(&self.inner.roster),
            self.inner.sink.clone(),
        )?);
        *self.inner.discovery.lock().await = Some(Arc::clone(&discovery));

        let mut tasks = self.inner.tasks.lock().await;

        let read_loop = Arc::clone(&discovery);
        tasks.push(tokio::spawn(async move {
            read_loop.run().await;
        }));

        let announcer = Arc::clone(&discovery);
        let interval = config.announce_interval;
        tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                if let Err(err) = announcer.announce_hello().await {
                    tracing::warn!(%err, "periodic announce failed");
                }
            }
        }));

        let engine = self.clone();
        tasks.push(tokio::spawn(async move {
            engine.accept_loop(listener).await;
        }));
        drop(tasks);

        // A failed broadcast is transient (the periodic announcer retries);
        // only bind failures are fatal to the subsystem
        if let Err(err) = discovery.announce_hello().await {
            tracing::warn!(%err, "initial announce failed");
        }
        Ok(())
    }

    /// Broadcast GOODBYE and stop all loops.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] if the engine is not running.
    pub async fn shutdown(&self) -> Result<()> {
        if self
            .inner
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::InvalidState("engine not running"));
        }

        if let Some(discovery) = self.inner.discovery.lock().await.take() {
            if let Err(err) = discovery.announce_goodbye().await {
                tracing::warn!(%err, "goodbye broadcast failed");
            }
        }

        for task in self.inner.tasks.lock().await.drain(..) {
            task.abort();
        }
        tracing::info!("engine stopped");
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    // Discovery operations
    // ───────────────────────────────────────────────────────────────────

    /// Broadcast a HELLO now (e.g. the host application returned to the
    /// foreground).
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] if the engine is not running.
    pub async fn announce(&self) -> Result<()> {
        match self.inner.discovery.lock().await.as_ref() {
            Some(discovery) => discovery.announce_hello().await,
            None => Err(EngineError::InvalidState("engine not running")),
        }
    }

    /// Change the display name advertised in all future announcements.
    ///
    /// Takes effect on the very next announce, periodic or triggered.
    pub fn set_nickname(&self, name: impl Into<String>) {
        self.inner.identity.set_nickname(name);
    }

    // ───────────────────────────────────────────────────────────────────
    // Transfer operations
    // ───────────────────────────────────────────────────────────────────

    /// Start sending `payload` to a destination string (`host[:port]`).
    ///
    /// Returns the session handle as soon as the transfer task is spawned;
    /// outcome and progress arrive as events.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidDestination`] before any I/O for a malformed
    /// destination, or [`EngineError::TransferIo`] /
    /// [`EngineError::InvalidState`] if the payload cannot be resolved.
    pub fn send(&self, dest: &str, payload: Payload) -> Result<SessionId> {
        let dest = Destination::parse(dest, self.inner.config.transfer_port)?;
        self.spawn_send(dest, payload)
    }

    /// Start sending to a peer from the roster (stored address and port).
    ///
    /// # Errors
    ///
    /// Same as [`Engine::send`], minus destination parsing.
    pub fn send_to_peer(&self, peer: &Peer, payload: Payload) -> Result<SessionId> {
        self.spawn_send(Destination::from_peer(peer), payload)
    }

    fn spawn_send(&self, dest: Destination, payload: Payload) -> Result<SessionId> {
        // Enumerate sources now so the total is fixed before any byte moves
        let resolved = payload.resolve()?;

        let ctx = self.new_session();
        let session = ctx.id;
        let engine = self.clone();
        tokio::spawn(async move {
            send::run_send(ctx, dest, resolved).await;
            engine.inner.active.remove(&session);
        });
        Ok(session)
    }

    /// Request cancellation of an in-flight session.
    ///
    /// Cooperative: the flag is observed at the next chunk boundary, after
    /// which the session ends in `SendAborted` (outbound) or
    /// `ReceiveCancelled` (inbound).
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] if the session is not active.
    pub fn abort(&self, session: SessionId) -> Result<()> {
        match self.inner.active.get(&session) {
            Some(flag) => {
                flag.store(true, Ordering::Relaxed);
                Ok(())
            }
            None => Err(EngineError::InvalidState("no such active session")),
        }
    }

    /// Session handles currently in flight.
    pub fn active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.inner.active.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    fn new_session(&self) -> SessionContext {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        let ctx = SessionContext::new(id, self.inner.sink.clone());
        self.inner.active.insert(id, ctx.abort_flag());
        ctx
    }

    /// Accept inbound transfer connections for the process lifetime.
    ///
    /// Each connection gets its own session and task; a failed accept is
    /// logged and the loop keeps going.
    async fn accept_loop(&self, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let ctx = self.new_session();
                    let session = ctx.id;
                    tracing::debug!(session, %peer, "inbound connection accepted");
                    let engine = self.clone();
                    let download_dir = self.inner.config.download_dir.clone();
                    tokio::spawn(async move {
                        recv::run_receive(ctx, stream, peer.ip(), download_dir).await;
                        engine.inner.active.remove(&session);
                    });
                }
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dir: &std::path::Path) -> EngineConfig {
        EngineConfig {
            nickname: "test-node".into(),
            download_dir: dir.to_path_buf(),
            // Port 0 everywhere so tests never collide
            discovery_port: 0,
            transfer_port: 0,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn double_start_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = Engine::new(test_config(dir.path()));
        engine.start().await.unwrap();
        assert!(matches!(
            engine.start().await,
            Err(EngineError::InvalidState(_))
        ));
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn failed_start_leaves_engine_restartable() {
        let dir = tempfile::tempdir().unwrap();
        // Occupy a port so the transfer listener bind fails
        let blocker = TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = blocker.local_addr().unwrap().port();

        let config = EngineConfig {
            transfer_port: port,
            ..test_config(dir.path())
        };
        let (engine, _rx) = Engine::new(config);

        assert!(matches!(engine.start().await, Err(EngineError::Bind(_))));
        assert!(engine.transfer_addr().is_none());
        // Still stopped: shutdown has nothing to stop
        assert!(matches!(
            engine.shutdown().await,
            Err(EngineError::InvalidState(_))
        ));

        drop(blocker);
        engine.start().await.unwrap();
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn start_records_bound_transfer_addr() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = Engine::new(test_config(dir.path()));
        assert!(engine.transfer_addr().is_none());
        engine.start().await.unwrap();
        let addr = engine.transfer_addr().unwrap();
        assert_ne!(addr.port(), 0);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_without_start_is_invalid_state() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = Engine::new(test_config(dir.path()));
        assert!(matches!(
            engine.shutdown().await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn announce_requires_running_engine() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = Engine::new(test_config(dir.path()));
        assert!(matches!(
            engine.announce().await,
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn malformed_destination_fails_before_any_io() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, mut rx) = Engine::new(test_config(dir.path()));
        let err = engine
            .send("10.0.0.5:abc", Payload::Text("x".into()))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDestination(_)));
        // No session, no events
        assert!(engine.active_sessions().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn abort_of_unknown_session_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = Engine::new(test_config(dir.path()));
        assert!(matches!(
            engine.abort(12345),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn session_ids_are_unique_and_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = Engine::new(test_config(dir.path()));
        let a = engine.new_session().id;
        let b = engine.new_session().id;
        assert!(b > a);
    }

    #[tokio::test]
    async fn nickname_change_needs_no_restart() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _rx) = Engine::new(test_config(dir.path()));
        engine.set_nickname("renamed");
        assert_eq!(engine.inner.identity.nickname(), "renamed");
    }
}
