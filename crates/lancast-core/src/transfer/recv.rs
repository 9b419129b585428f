//! Inbound transfer state machine.
//!
//! For each accepted connection: read and decode the transfer header, then
//! stream the declared payload. TEXT is buffered to its declared length and
//! delivered in one `ReceiveTextComplete`. FILES entries are written under
//! the configured download directory with aggregate progress across all
//! entries, ending in `ReceiveFilesComplete`. Any short read, connection
//! drop, or local write failure ends the session in `ReceiveCancelled`;
//! partially written files are left on disk as-is (no cleanup, no resume).
//!
//! Name collisions never overwrite: an existing file makes the new one
//! `stem (N).ext`, an existing top-level folder makes the incoming set land
//! in `name (N)`, with the smallest free N >= 1 in both cases. Names are
//! reserved atomically (`create_new` / `create_dir`), so concurrent sessions
//! delivering the same name cannot truncate each other's files.

use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::transfer::{SessionContext, CHUNK_SIZE};
use lancast_wire::header::{body_len, HEADER_PRELUDE_LEN};
use lancast_wire::TransferHeader;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TEXT payloads are buffered whole; larger declarations are refused.
const MAX_TEXT_LEN: u64 = 64 * 1024 * 1024;

/// Drive one inbound connection to its terminal event.
pub(crate) async fn run_receive(
    ctx: SessionContext,
    stream: TcpStream,
    sender: IpAddr,
    download_dir: PathBuf,
) {
    let session = ctx.id;
    match receive_inner(&ctx, stream, sender, &download_dir).await {
        Ok(Outcome::Files { paths, total }) => {
            tracing::info!(session, %sender, files = paths.len(), total, "receive complete");
            ctx.sink.publish(EngineEvent::ReceiveFilesComplete {
                session,
                paths,
                total,
            });
        }
        Ok(Outcome::Text { text, size }) => {
            tracing::info!(session, %sender, size, "text snippet received");
            ctx.sink
                .publish(EngineEvent::ReceiveTextComplete { session, text, size });
        }
        Err(err) => {
            tracing::warn!(session, %sender, %err, "receive cancelled");
            ctx.sink.publish(EngineEvent::ReceiveCancelled { session });
        }
    }
}

enum Outcome {
    Files { paths: Vec<PathBuf>, total: u64 },
    Text { text: String, size: u64 },
}

async fn receive_inner(
    ctx: &SessionContext,
    mut stream: TcpStream,
    sender: IpAddr,
    download_dir: &Path,
) -> Result<Outcome, EngineError> {
    let header = read_header(&mut stream).await?;

    match header {
        TransferHeader::Text { length } => {
            if length > MAX_TEXT_LEN {
                return Err(EngineError::TransferIo(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("declared text length {length} exceeds the buffering bound"),
                )));
            }
            let mut buf = vec![0u8; length as usize];
            stream
                .read_exact(&mut buf)
                .await
                .map_err(EngineError::TransferIo)?;
            let text = String::from_utf8(buf).map_err(|_| {
                EngineError::TransferIo(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "text payload is not valid UTF-8",
                ))
            })?;
            Ok(Outcome::Text {
                text,
                size: length,
            })
        }
        TransferHeader::Files { entries, total } => {
            if !entries.is_empty() {
                ctx.sink.publish(EngineEvent::ReceiveStart {
                    session: ctx.id,
                    sender,
                });
            }

            tokio::fs::create_dir_all(download_dir)
                .await
                .map_err(EngineError::TransferIo)?;

            let mut paths = Vec::with_capacity(entries.len());
            let mut transferred: u64 = 0;
            // Per-session renames of top-level folders, so every entry of a
            // colliding set lands in the same alternate folder
            let mut root_map: HashMap<String, String> = HashMap::new();

            for entry in &entries {
                let dest = entry_destination(download_dir, &entry.path, &mut root_map)?;
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(EngineError::TransferIo)?;
                }
                let (dest, file) = create_unique_file(&dest).await?;
                tracing::debug!(session = ctx.id, dest = %dest.display(), size = entry.size, "writing entry");

                stream_to_file(ctx, &mut stream, file, entry.size, total, &mut transferred)
                    .await?;
                paths.push(dest);
            }

            Ok(Outcome::Files { paths, total })
        }
    }
}

/// Read exactly one transfer header off the stream.
async fn read_header(stream: &mut TcpStream) -> Result<TransferHeader, EngineError> {
    let mut prelude = [0u8; HEADER_PRELUDE_LEN];
    stream
        .read_exact(&mut prelude)
        .await
        .map_err(EngineError::TransferIo)?;
    let body = body_len(&prelude).map_err(EngineError::MalformedDatagram)?;

    let mut buf = Vec::with_capacity(HEADER_PRELUDE_LEN + body);
    buf.extend_from_slice(&prelude);
    buf.resize(HEADER_PRELUDE_LEN + body, 0);
    stream
        .read_exact(&mut buf[HEADER_PRELUDE_LEN..])
        .await
        .map_err(EngineError::TransferIo)?;

    let (header, _) = TransferHeader::decode(&buf).map_err(EngineError::MalformedDatagram)?;
    Ok(header)
}

/// Map a wire entry path to its destination, applying sanitization and the
/// session's top-level folder renames. The first entry under a root folder
/// reserves (creates) that folder for the whole session.
fn entry_destination(
    download_dir: &Path,
    wire_path: &str,
    root_map: &mut HashMap<String, String>,
) -> Result<PathBuf, EngineError> {
    let components = sanitize_rel_path(wire_path)?;

    if components.len() == 1 {
        // Bare file; collision handled per file by the caller
        return Ok(download_dir.join(&components[0]));
    }

    let root = &components[0];
    let mapped = match root_map.get(root) {
        Some(mapped) => mapped.clone(),
        None => {
            let mapped = reserve_root_dir(download_dir, root)?;
            root_map.insert(root.clone(), mapped.clone());
            mapped
        }
    };

    let mut dest = download_dir.join(mapped);
    for component in &components[1..] {
        dest.push(component);
    }
    Ok(dest)
}

/// Split and validate a `/`-separated wire path.
///
/// Rejects absolute paths, traversal components, and empty components; a
/// malicious header must not be able to escape the download directory.
fn sanitize_rel_path(wire_path: &str) -> Result<Vec<String>, EngineError> {
    let normalized = wire_path.replace('\\', "/");
    let mut components = Vec::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => continue,
            ".." => {
                return Err(EngineError::TransferIo(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("path traversal in entry: {wire_path:?}"),
                )))
            }
            part => components.push(part.to_string()),
        }
    }
    if components.is_empty() {
        return Err(EngineError::TransferIo(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("empty entry path: {wire_path:?}"),
        )));
    }
    Ok(components)
}

/// Create and open the entry file, probing `stem (N).ext` alternates.
///
/// Every candidate is opened with `create_new`, which reserves the name
/// atomically: a concurrent session delivering the same name loses the race
/// for that candidate and moves on to the next alternate, so no session can
/// truncate a file another one is writing.
async fn create_unique_file(path: &Path) -> Result<(PathBuf, tokio::fs::File), EngineError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("received");
    let ext = path.extension().and_then(|e| e.to_str());
    let parent = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();

    let mut candidate = path.to_path_buf();
    let mut n = 0u32;
    loop {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                n += 1;
                let name = match ext {
                    Some(ext) => format!("{stem} ({n}).{ext}"),
                    None => format!("{stem} ({n})"),
                };
                candidate = parent.join(name);
            }
            Err(err) => return Err(EngineError::TransferIo(err)),
        }
    }
}

/// Create the top-level folder of a set, probing `name (N)` alternates.
///
/// `create_dir` reserves the name the same way `create_new` does for files.
fn reserve_root_dir(download_dir: &Path, name: &str) -> Result<String, EngineError> {
    let mut candidate = name.to_string();
    let mut n = 0u32;
    loop {
        match std::fs::create_dir(download_dir.join(&candidate)) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                n += 1;
                candidate = format!("{name} ({n})");
            }
            Err(err) => return Err(EngineError::TransferIo(err)),
        }
    }
}

/// Stream exactly `size` bytes from the connection into the opened file.
async fn stream_to_file(
    ctx: &SessionContext,
    stream: &mut TcpStream,
    mut file: tokio::fs::File,
    size: u64,
    total: u64,
    transferred: &mut u64,
) -> Result<(), EngineError> {
    let mut remaining = size;
    let mut buf = vec![0u8; CHUNK_SIZE];

    while remaining > 0 {
        if ctx.aborted() {
            return Err(EngineError::Aborted);
        }
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let got = stream
            .read(&mut buf[..want])
            .await
            .map_err(EngineError::TransferIo)?;
        if got == 0 {
            return Err(EngineError::TransferIo(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-entry",
            )));
        }
        file.write_all(&buf[..got])
            .await
            .map_err(EngineError::TransferIo)?;
        remaining -= got as u64;
        *transferred += got as u64;
        ctx.progress(total, *transferred);
    }

    file.flush().await.map_err(EngineError::TransferIo)?;
    Ok(())
}
