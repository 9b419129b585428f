//! Lancast CLI
//!
//! LAN sharing from the command line: discover peers by UDP broadcast,
//! send files, folders and text snippets over TCP, receive into a
//! download folder.

mod config;
mod progress;

use clap::{Parser, Subcommand};
use lancast_core::{Engine, EngineEvent, Payload, SessionId};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;

use config::Config;
use progress::{format_bytes, TransferBar};

/// Lancast - share files and text on the local network
#[derive(Parser)]
#[command(name = "lancast")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Display name advertised to the network
    #[arg(short, long)]
    nickname: Option<String>,

    /// Discovery and transfer port
    #[arg(short, long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Announce presence and receive transfers until interrupted
    Listen {
        /// Folder received payloads are saved under
        #[arg(short, long)]
        download_dir: Option<PathBuf>,
    },

    /// Send files or folders to a destination
    Send {
        /// Destination, `host` or `host:port`
        #[arg(required = true)]
        dest: String,

        /// Files and folders to send
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Send a text snippet to a destination
    SendText {
        /// Destination, `host` or `host:port`
        #[arg(required = true)]
        dest: String,

        /// The text to send
        #[arg(required = true)]
        text: String,
    },

    /// Discover and list peers on the local network
    Peers {
        /// Seconds to wait for announcements
        #[arg(short, long, default_value_t = 3)]
        wait: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if cli.verbose { "debug" } else { "warn" }.into()
            }),
        )
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Listen { download_dir } => {
            let engine_config =
                config.into_engine_config(cli.nickname, download_dir, cli.port);
            listen(engine_config).await?;
        }
        Commands::Send { dest, paths } => {
            let engine_config = config.into_engine_config(cli.nickname, None, cli.port);
            send_payload(engine_config, &dest, Payload::Files(paths)).await?;
        }
        Commands::SendText { dest, text } => {
            let engine_config = config.into_engine_config(cli.nickname, None, cli.port);
            send_payload(engine_config, &dest, Payload::Text(text)).await?;
        }
        Commands::Peers { wait } => {
            let engine_config = config.into_engine_config(cli.nickname, None, cli.port);
            list_peers(engine_config, wait).await?;
        }
    }

    Ok(())
}

/// Run the engine in the foreground, printing roster changes and
/// receiving transfers, until Ctrl+C.
async fn listen(config: lancast_core::EngineConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.download_dir)?;

    let (engine, mut events) = Engine::new(config);
    engine.start().await?;

    let port = engine
        .transfer_addr()
        .map_or(engine.config().transfer_port, |a| a.port());
    println!("Listening as '{}'", engine.config().nickname);
    println!("Saving to {}", engine.config().download_dir.display());
    for addr in engine.local_addrs() {
        println!("Reachable at {addr}:{port}");
    }
    println!("Press Ctrl+C to stop");
    println!();

    let mut bars: HashMap<SessionId, TransferBar> = HashMap::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                report_inbound(event, &mut bars);
            }
        }
    }

    println!("\nShutting down...");
    engine.shutdown().await?;
    Ok(())
}

fn report_inbound(event: EngineEvent, bars: &mut HashMap<SessionId, TransferBar>) {
    match event {
        EngineEvent::PeerAdded(peer) => {
            println!("+ {} ({}) at {}", peer.name, peer.platform, peer.addr);
        }
        EngineEvent::PeerRemoved(peer) => {
            println!("- {} left", peer.name);
        }
        EngineEvent::ReceiveStart { session, sender } => {
            println!("Incoming transfer from {sender} (session {session})");
        }
        EngineEvent::Progress {
            session,
            total,
            transferred,
        } => {
            bars.entry(session)
                .or_insert_with(|| TransferBar::new(total, &format!("session {session}")))
                .update(transferred);
        }
        EngineEvent::ReceiveFilesComplete {
            session,
            paths,
            total,
        } => {
            if let Some(bar) = bars.remove(&session) {
                bar.finish("done");
            }
            println!(
                "Received {} item(s), {}:",
                paths.len(),
                format_bytes(total)
            );
            for path in paths {
                println!("  {}", path.display());
            }
        }
        EngineEvent::ReceiveTextComplete { session, text, size } => {
            if let Some(bar) = bars.remove(&session) {
                bar.finish("done");
            }
            println!("Received text ({}):", format_bytes(size));
            println!("{text}");
        }
        EngineEvent::ReceiveCancelled { session } => {
            if let Some(bar) = bars.remove(&session) {
                bar.abandon("cancelled");
            }
            println!("Transfer cancelled (session {session})");
        }
        // Outbound events do not occur in listen mode
        EngineEvent::SendComplete { .. }
        | EngineEvent::SendFailed { .. }
        | EngineEvent::SendAborted { .. } => {}
    }
}

/// Send one payload and wait for its terminal event.
///
/// Sending needs no bound sockets, so the engine is never started;
/// Ctrl+C requests a cooperative abort instead of killing the process.
async fn send_payload(
    config: lancast_core::EngineConfig,
    dest: &str,
    payload: Payload,
) -> anyhow::Result<()> {
    let (engine, events) = Engine::new(config);
    let session = engine.send(dest, payload)?;
    tracing::debug!(session, dest, "transfer started");

    drive_send(&engine, events, session).await
}

async fn drive_send(
    engine: &Engine,
    mut events: UnboundedReceiver<EngineEvent>,
    session: SessionId,
) -> anyhow::Result<()> {
    let mut bar: Option<TransferBar> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                // Second Ctrl+C while the abort drains is a no-op
                let _ = engine.abort(session);
            }
            event = events.recv() => {
                let Some(event) = event else {
                    anyhow::bail!("transfer task ended without a result");
                };
                if event.session() != Some(session) {
                    continue;
                }
                match event {
                    EngineEvent::Progress { total, transferred, .. } => {
                        bar.get_or_insert_with(|| TransferBar::new(total, "sending"))
                            .update(transferred);
                    }
                    EngineEvent::SendComplete { paths, .. } => {
                        if let Some(bar) = &bar {
                            bar.finish("sent");
                        }
                        println!("Sent {} item(s)", paths.len().max(1));
                        return Ok(());
                    }
                    EngineEvent::SendAborted { .. } => {
                        if let Some(bar) = &bar {
                            bar.abandon("aborted");
                        }
                        println!("Transfer aborted");
                        return Ok(());
                    }
                    EngineEvent::SendFailed { error, .. } => {
                        if let Some(bar) = &bar {
                            bar.abandon("failed");
                        }
                        anyhow::bail!("transfer failed: {error}");
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Announce, collect HELLOs for `wait` seconds, print the roster.
async fn list_peers(config: lancast_core::EngineConfig, wait: u64) -> anyhow::Result<()> {
    let (engine, mut events) = Engine::new(config);
    engine.start().await?;

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(wait);
    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            event = events.recv() => {
                if event.is_none() {
                    break;
                }
            }
        }
    }

    let peers = engine.roster().list();
    println!("You ({})", engine.config().nickname);
    for addr in engine.local_addrs() {
        println!("  {}:{}", addr, engine.config().transfer_port);
    }
    println!();
    if peers.is_empty() {
        println!("No peers found in {wait}s");
    } else {
        println!("Peers:");
        for peer in peers {
            println!(
                "  {} ({}) at {}:{}",
                peer.name, peer.platform, peer.addr, peer.port
            );
        }
    }

    engine.shutdown().await?;
    Ok(())
}
