//! # Lancast Core
//!
//! The lancast protocol engine: LAN peer discovery over UDP broadcast, the
//! peer roster, and the TCP transfer pipeline for files, folders and text
//! snippets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Engine                                  │
//! │     (lifecycle, session handles, send/abort entry points)       │
//! ├───────────────────────────────┬─────────────────────────────────┤
//! │      Discovery Listener       │        Transfer Engine          │
//! │  (broadcast HELLO/GOODBYE,    │  (inbound accept loop, send     │
//! │   feeds the Peer Roster)      │   and receive state machines)   │
//! ├───────────────────────────────┴─────────────────────────────────┤
//! │                         Event Sink                               │
//! │     (variant messages the presentation layer subscribes to)     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Three long-lived tasks run for the process lifetime: the discovery read
//! loop, the periodic announcer, and the inbound accept loop. Every
//! transfer gets its own task and its own [`SessionId`]; all observable
//! state changes arrive through one event channel.
//!
//! ## Example
//!
//! ```no_run
//! use lancast_core::{Engine, EngineConfig, EngineEvent, Payload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (engine, mut events) = Engine::new(EngineConfig::default());
//!     engine.start().await?;
//!
//!     engine.send("192.168.1.17", Payload::Text("hi!".into()))?;
//!     while let Some(event) = events.recv().await {
//!         if event.is_terminal() {
//!             break;
//!         }
//!     }
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod destination;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod events;
pub mod payload;
pub mod roster;
pub mod transfer;

pub use config::{EngineConfig, ANNOUNCE_INTERVAL, DEFAULT_PORT};
pub use destination::Destination;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use events::{EngineEvent, EventSink, SessionId};
pub use payload::Payload;
pub use roster::{Peer, PeerRoster};
pub use transfer::CHUNK_SIZE;
