//! Socket driver for one control connection.
//!
//! Reads are fed to a [`ConnectionSession`]; the events it returns are acted
//! on here. Replies the session causes directly (progress, query answers)
//! are written inline so they keep their order relative to the bytes that
//! caused them. Replies from background ingest jobs arrive through an mpsc
//! channel and are written between reads.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::error::ErrorCode;
use crate::events::ClientEvent;
use crate::protocol::{encode_frame, ServerMessage};
use crate::protocol_constants::{OUTBOUND_CHANNEL_CAPACITY, READ_CHUNK_SIZE};
use crate::runtime::WorkerPool;
use crate::server::session::{CompletedUpload, ConnectionSession, SessionEvent};
use crate::server::ControlState;
use crate::services::{stage_upload, IngestRequest};
use crate::utils::now_millis;

/// Serves one client until it disconnects, breaks framing, or the server
/// closes connections.
pub(crate) async fn handle_connection(stream: TcpStream, peer: SocketAddr, state: ControlState) {
    if let Err(e) = stream.set_nodelay(true) {
        log::debug!("[Session] Failed to set TCP_NODELAY for {}: {}", peer, e);
    }

    let guard = state.connections.register(peer);
    let id = guard.id();
    let cancel = guard.cancel_token().clone();

    let (mut reader, mut writer) = stream.into_split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CHANNEL_CAPACITY);
    let mut session = ConnectionSession::new(state.max_upload_bytes);
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::debug!("[Session] Connection {} closed by server", id);
                break;
            }

            Some(message) = reply_rx.recv() => {
                if let Err(e) = write_message(&mut writer, &message).await {
                    log::warn!("[Session] Write to connection {} failed: {}", id, e);
                    break;
                }
            }

            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        log::warn!("[Session] Read from connection {} failed: {}", id, e);
                        break;
                    }
                };

                let events = match session.receive(&buf[..n]) {
                    Ok(events) => events,
                    Err(e) => {
                        log::warn!("[Session] Closing connection {} [{}]: {}", id, e.code(), e);
                        break;
                    }
                };

                let uploader = session.registration().map(|r| r.name.clone());
                let mut failed = false;
                for event in events {
                    let ctx = EventContext { id, uploader: uploader.as_deref(), reply_tx: &reply_tx };
                    if let Err(e) = handle_event(event, ctx, &state, &mut writer).await {
                        log::warn!("[Session] Write to connection {} failed: {}", id, e);
                        failed = true;
                        break;
                    }
                }
                if failed {
                    break;
                }
            }
        }
    }

    if session.upload_progress().is_some() {
        log::info!("[Session] Connection {} dropped mid-upload, discarding", id);
    }
    state.emitter.emit_client(ClientEvent::Disconnected {
        connection_id: id,
        timestamp: now_millis(),
    });
}

struct EventContext<'a> {
    id: u64,
    uploader: Option<&'a str>,
    reply_tx: &'a mpsc::Sender<ServerMessage>,
}

async fn handle_event(
    event: SessionEvent,
    ctx: EventContext<'_>,
    state: &ControlState,
    writer: &mut OwnedWriteHalf,
) -> std::io::Result<()> {
    match event {
        SessionEvent::Registered(registration) => {
            log::info!(
                "[Session] Connection {} registered as {} ({})",
                ctx.id,
                registration.name,
                registration.mac_id
            );
            state.connections.set_name(ctx.id, &registration.name);
            state.emitter.emit_client(ClientEvent::Registered {
                connection_id: ctx.id,
                name: registration.name.clone(),
                mac_id: registration.mac_id.clone(),
                timestamp: now_millis(),
            });

            let catalog = Arc::clone(&state.catalog);
            state.pool.submit(async move {
                let name = registration.name.clone();
                let result = WorkerPool::run_blocking(move || {
                    catalog.upsert_user(&registration.name, &registration.mac_id)
                })
                .await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => log::warn!("[Session] Failed to record user {}: {}", name, e),
                    Err(e) => log::warn!("[Session] User task for {} failed: {}", name, e),
                }
            });
        }

        SessionEvent::Query => {
            write_message(writer, &ServerMessage::Queue(state.queue.snapshot())).await?;
        }

        SessionEvent::UploadStarted { filename, size } => {
            log::info!(
                "[Session] Connection {} uploading {} ({} bytes)",
                ctx.id,
                filename,
                size
            );
        }

        SessionEvent::Progress(progress) => {
            write_message(writer, &ServerMessage::Progress { progress }).await?;
        }

        SessionEvent::UploadComplete(upload) => {
            log::info!(
                "[Session] Connection {} finished {} ({} bytes)",
                ctx.id,
                upload.filename,
                upload.size
            );
            dispatch_ingest(
                upload,
                ctx.id,
                ctx.uploader.unwrap_or_default().to_string(),
                ctx.reply_tx.clone(),
                state,
            );
        }

        SessionEvent::Rejected(e) => {
            log::warn!(
                "[Session] Connection {} sent an unusable message [{}]: {}",
                ctx.id,
                e.code(),
                e
            );
        }
    }
    Ok(())
}

/// Stages the upload and runs ingest on the worker pool.
fn dispatch_ingest(
    upload: CompletedUpload,
    connection_id: u64,
    uploader: String,
    reply_tx: mpsc::Sender<ServerMessage>,
    state: &ControlState,
) {
    let pipeline = Arc::clone(&state.pipeline);
    let staging_dir = state.staging_dir.clone();

    state.pool.submit(async move {
        let staged_path = match stage_upload(&staging_dir, connection_id, &upload).await {
            Ok(path) => path,
            Err(e) => {
                log::warn!("[Session] {} [{}]", e, e.code());
                if reply_tx
                    .send(ServerMessage::Error {
                        error: e.to_string(),
                    })
                    .await
                    .is_err()
                {
                    log::debug!("[Session] Connection {} gone before error reply", connection_id);
                }
                return;
            }
        };

        let request = IngestRequest {
            staged_path,
            filename: upload.filename,
            size: upload.size,
            tags: upload.tags,
            uploader,
        };
        pipeline.process(request, reply_tx).await;
    });
}

async fn write_message(writer: &mut OwnedWriteHalf, message: &ServerMessage) -> std::io::Result<()> {
    let frame = encode_frame(message).map_err(std::io::Error::other)?;
    writer.write_all(&frame).await
}
