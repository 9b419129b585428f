//! Outbound transfer state machine.
//!
//! Connect, write the header, stream payload bytes in header order, emit
//! progress after every chunk. The terminal outcome is one of
//! `SendComplete`, `SendFailed`, or `SendAborted` - aborting is a distinct
//! outcome, not a failure.

use crate::destination::Destination;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::payload::ResolvedPayload;
use crate::transfer::{SessionContext, CHUNK_SIZE};
use std::path::PathBuf;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

/// Drive one outbound transfer to its terminal event.
pub(crate) async fn run_send(ctx: SessionContext, dest: Destination, payload: ResolvedPayload) {
    let session = ctx.id;
    match send_inner(&ctx, &dest, payload).await {
        Ok(paths) => {
            tracing::info!(session, host = %dest.host, "send complete");
            ctx.sink.publish(EngineEvent::SendComplete { session, paths });
        }
        Err(EngineError::Aborted) => {
            tracing::info!(session, "send aborted by user");
            ctx.sink.publish(EngineEvent::SendAborted { session });
        }
        Err(err) => {
            tracing::warn!(session, %err, "send failed");
            ctx.sink.publish(EngineEvent::SendFailed {
                session,
                error: err.to_string(),
            });
        }
    }
}

async fn send_inner(
    ctx: &SessionContext,
    dest: &Destination,
    payload: ResolvedPayload,
) -> Result<Vec<PathBuf>, EngineError> {
    let (host, port) = dest.authority();
    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .map_err(EngineError::Connect)?;
    let mut writer = BufWriter::new(stream);

    let total = payload.total_size();
    let mut transferred: u64 = 0;

    match payload {
        ResolvedPayload::Text { header, bytes } => {
            let header_bytes = header.encode().map_err(EngineError::MalformedDatagram)?;
            writer
                .write_all(&header_bytes)
                .await
                .map_err(EngineError::TransferIo)?;

            for chunk in bytes.chunks(CHUNK_SIZE) {
                if ctx.aborted() {
                    return Err(EngineError::Aborted);
                }
                writer.write_all(chunk).await.map_err(EngineError::TransferIo)?;
                transferred += chunk.len() as u64;
                ctx.progress(total, transferred);
            }

            writer.flush().await.map_err(EngineError::TransferIo)?;
            Ok(Vec::new())
        }
        ResolvedPayload::Files { header, entries } => {
            let header_bytes = header.encode().map_err(EngineError::MalformedDatagram)?;
            writer
                .write_all(&header_bytes)
                .await
                .map_err(EngineError::TransferIo)?;

            let mut paths = Vec::with_capacity(entries.len());
            for entry in &entries {
                tracing::debug!(session = ctx.id, entry = %entry.rel_path, "streaming entry");
                stream_file(ctx, &mut writer, entry, total, &mut transferred).await?;
                paths.push(entry.source.clone());
            }

            writer.flush().await.map_err(EngineError::TransferIo)?;
            Ok(paths)
        }
    }
}

/// Stream exactly `entry.size` bytes of one file.
///
/// The header announced the size up front; a source that shrank since
/// enumeration is a transfer error, one that grew is cut at the announced
/// size.
async fn stream_file(
    ctx: &SessionContext,
    writer: &mut BufWriter<TcpStream>,
    entry: &crate::payload::SourceEntry,
    total: u64,
    transferred: &mut u64,
) -> Result<(), EngineError> {
    let mut file = tokio::fs::File::open(&entry.source)
        .await
        .map_err(EngineError::TransferIo)?;
    let mut remaining = entry.size;
    let mut buf = vec![0u8; CHUNK_SIZE];

    while remaining > 0 {
        if ctx.aborted() {
            return Err(EngineError::Aborted);
        }
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let got = file
            .read(&mut buf[..want])
            .await
            .map_err(EngineError::TransferIo)?;
        if got == 0 {
            return Err(EngineError::TransferIo(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("source file shrank: {}", entry.source.display()),
            )));
        }
        writer
            .write_all(&buf[..got])
            .await
            .map_err(EngineError::TransferIo)?;
        remaining -= got as u64;
        *transferred += got as u64;
        ctx.progress(total, *transferred);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSink;
    use crate::payload::Payload;
    use std::io::Write;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn drain_listener(listener: TcpListener) -> Vec<u8> {
        let (mut conn, _) = listener.accept().await.unwrap();
        let mut data = Vec::new();
        conn.read_to_end(&mut data).await.unwrap();
        data
    }

    #[tokio::test]
    async fn text_send_emits_progress_then_complete() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(drain_listener(listener));

        let (sink, mut rx) = EventSink::channel();
        let ctx = SessionContext::new(1, sink);
        let dest = Destination::parse(&format!("127.0.0.1:{port}"), 4644).unwrap();
        let payload = Payload::Text("hello over the wire".into()).resolve().unwrap();

        run_send(ctx, dest, payload).await;

        let mut saw_progress = false;
        let mut terminal = None;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                EngineEvent::Progress {
                    total, transferred, ..
                } => {
                    saw_progress = true;
                    assert_eq!(total, 19);
                    assert!(transferred <= total);
                }
                ev if ev.is_terminal() => terminal = Some(ev),
                _ => {}
            }
        }
        assert!(saw_progress);
        assert!(matches!(terminal, Some(EngineEvent::SendComplete { .. })));

        let wire = server.await.unwrap();
        assert!(wire.ends_with(b"hello over the wire"));
    }

    #[tokio::test]
    async fn connect_refused_emits_send_failed() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (sink, mut rx) = EventSink::channel();
        let ctx = SessionContext::new(2, sink);
        let dest = Destination::parse(&format!("127.0.0.1:{port}"), 4644).unwrap();
        let payload = Payload::Text("x".into()).resolve().unwrap();

        run_send(ctx, dest, payload).await;

        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], EngineEvent::SendFailed { session: 2, .. }));
    }

    #[tokio::test]
    async fn pre_aborted_send_emits_exactly_one_send_aborted() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(drain_listener(listener));

        let (sink, mut rx) = EventSink::channel();
        let ctx = SessionContext::new(3, sink);
        ctx.abort_flag().store(true, std::sync::atomic::Ordering::Relaxed);

        let dest = Destination::parse(&format!("127.0.0.1:{port}"), 4644).unwrap();
        let payload = Payload::Text("never delivered".into()).resolve().unwrap();
        run_send(ctx, dest, payload).await;

        let mut terminals = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.is_terminal() {
                terminals += 1;
                assert!(matches!(ev, EngineEvent::SendAborted { session: 3 }));
            }
        }
        assert_eq!(terminals, 1);
        drop(server);
    }

    #[tokio::test]
    async fn file_send_streams_header_then_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&[0xabu8; 1000])
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(drain_listener(listener));

        let (sink, mut rx) = EventSink::channel();
        let ctx = SessionContext::new(4, sink);
        let dest = Destination::parse(&format!("127.0.0.1:{port}"), 4644).unwrap();
        let payload = Payload::Files(vec![path.clone()]).resolve().unwrap();
        run_send(ctx, dest, payload).await;

        let wire = server.await.unwrap();
        let (header, consumed) = lancast_wire::TransferHeader::decode(&wire).unwrap();
        assert_eq!(header.total_size(), 1000);
        assert_eq!(wire.len() - consumed, 1000);

        let mut last = 0u64;
        let mut terminal = None;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                EngineEvent::Progress { transferred, .. } => {
                    assert!(transferred >= last, "progress must not decrease");
                    last = transferred;
                }
                ev if ev.is_terminal() => terminal = Some(ev),
                _ => {}
            }
        }
        assert_eq!(last, 1000);
        match terminal {
            Some(EngineEvent::SendComplete { paths, .. }) => assert_eq!(paths, vec![path]),
            other => panic!("expected SendComplete, got {other:?}"),
        }
    }
}
