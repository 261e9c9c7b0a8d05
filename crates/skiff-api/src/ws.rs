//! The fan-out WebSocket hub.
//!
//! Each client gets a reader task (this handler) and a writer task draining
//! its bounded queue. The join replay runs under the session write lock, so a
//! new member either sees a file in its replay or receives the live
//! broadcast, never both and never neither. Inline file receive paths share
//! the per-path write locks with the HTTP upload engine, so the same name can
//! never be written by both paths at once.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

use skiff_core::frame::{self, Frame, FrameKind};
use skiff_services::disk;
use skiff_services::{ClientHandle, FileMeta, ReceivingFile, Session};

use crate::handlers::{sanitize_filename, ApiState};

pub async fn ws_upgrade(
    Path(session_id): Path<String>,
    State(state): State<ApiState>,
    ws: WebSocketUpgrade,
) -> Response {
    // Legitimate binary-in-JSON frames run several times the chunk size;
    // the configured maximum file size is the only sane ceiling.
    let max = state.config.storage.max_file_size as usize;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket(socket: WebSocket, session_id: String, state: ApiState) {
    let client_id = Uuid::new_v4();
    let (handle, mut outbound) = ClientHandle::new(client_id);
    let session = state.sessions.get_or_create(&session_id);

    // Join protocol, under the write lock so no broadcast can interleave
    // with the replay: membership, text snapshot, file catalog, fresh count.
    {
        let mut s = session.state.write().await;
        s.add_client(handle.clone());
        if !s.text_content.is_empty() {
            handle.push_frame(&Frame::text(&session_id, s.text_content.clone()));
        }
        for meta in s.received_files.values() {
            handle.push_frame(&Frame::file_available(
                &session_id,
                &meta.name,
                meta.size,
                meta.backing_path.display().to_string(),
            ));
        }
        s.broadcast_client_count(&session_id);
        tracing::info!(session_id, client = %client_id, clients = s.client_count(), "client joined");
    }
    handle.push_frame(&Frame::system(&session_id, "connected"));

    // The session's clone is now the only sender: if a broadcast evicts this
    // client, the channel closes and the writer shuts the socket down.
    drop(handle);

    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(payload) = outbound.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                if let Err(e) = handle_frame(&state, &session, &session_id, text.as_str()).await {
                    tracing::warn!(session_id, error = %e, "dropping unhandled frame");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.sessions.remove_client(&session_id, client_id).await;

    // With the session's handle gone the channel is closed; the writer
    // drains whatever is queued and exits.
    let _ = writer.await;
    tracing::debug!(session_id, client = %client_id, "socket closed");
}

async fn handle_frame(
    state: &ApiState,
    session: &Arc<Session>,
    session_id: &str,
    raw: &str,
) -> anyhow::Result<()> {
    let parsed: Frame = serde_json::from_str(raw)?;
    match parsed.kind {
        FrameKind::Text { content } => {
            let mut s = session.state.write().await;
            s.text_content = content;
            // The sender's frame goes back out unchanged, sender included;
            // clients tolerate their own echo.
            s.broadcast_raw(raw);
        }

        FrameKind::File { name, data, .. } => {
            let bytes = data
                .as_ref()
                .and_then(frame::data_bytes)
                .ok_or_else(|| anyhow::anyhow!("file frame without a byte-array payload"))?;
            let name = sanitize_filename(&name);
            let backing = state.sessions.backing_path(session_id, &name);
            let size = bytes.len() as u64;

            // All disk work happens before the session lock is taken.
            disk::allocate(state.engine.locks(), &backing, size).await?;
            disk::write_chunk_at(state.engine.locks(), &backing, &bytes, 0).await?;

            state
                .sessions
                .register_and_announce(
                    session_id,
                    FileMeta {
                        name: name.clone(),
                        size,
                        backing_path: backing,
                    },
                )
                .await;
            tracing::info!(session_id, file = %name, size, "inline file received");
        }

        FrameKind::FileChunk {
            name,
            size,
            data,
            total_chunks,
            current_chunk,
            ..
        } => {
            let bytes = frame::data_bytes(&data)
                .ok_or_else(|| anyhow::anyhow!("file_chunk frame without a byte-array payload"))?;
            let name = sanitize_filename(&name);
            let backing = state.sessions.backing_path(session_id, &name);
            let chunk_size = state.engine.chunk_size();

            // Receiver bookkeeping under the lock; allocation outside it.
            let first_chunk = {
                let mut s = session.state.write().await;
                match s.receiving.get_mut(&name) {
                    Some(rf) => {
                        // Legacy senders may only learn the chunk count late.
                        if rf.total_chunks == 0 && total_chunks > 0 {
                            rf.total_chunks = total_chunks;
                        }
                        false
                    }
                    None => {
                        s.receiving
                            .insert(name.clone(), ReceivingFile::new(&name, size, total_chunks));
                        true
                    }
                }
            };
            if first_chunk {
                disk::allocate(state.engine.locks(), &backing, size).await?;
                tracing::info!(session_id, file = %name, size, total_chunks, "receiving streamed file");
            }

            disk::write_chunk_at(
                state.engine.locks(),
                &backing,
                &bytes,
                current_chunk * chunk_size,
            )
            .await?;

            let completed = {
                let mut s = session.state.write().await;
                let Some(rf) = s.receiving.get_mut(&name) else {
                    // Torn down while the write was in flight.
                    return Ok(());
                };
                rf.received_count += 1;
                if rf.is_complete(chunk_size) {
                    s.receiving.remove(&name);
                    true
                } else {
                    false
                }
            };
            if completed {
                state
                    .sessions
                    .register_and_announce(
                        session_id,
                        FileMeta {
                            name: name.clone(),
                            size,
                            backing_path: backing,
                        },
                    )
                    .await;
                tracing::info!(session_id, file = %name, size, "streamed file complete");
            }
        }

        // Server-originated frame types; nothing to do when a client sends them.
        FrameKind::Clients { .. } | FrameKind::System { .. } => {}
    }
    Ok(())
}
