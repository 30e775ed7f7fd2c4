//! Uploader-side per-connection state machine.
//!
//! One task per connection; every transition is driven by a decoded frame
//! or by the transport closing. Messages that are not valid for the current
//! state are ignored. Chunk emission interleaves with the inbound queue so
//! `Pause` and `Done` are handled between chunks, never after the file.

use std::cmp::min;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::SessionInner;
use crate::core::domain::{ConnectionRecord, ConnectionState, FileEntry, TransferCursor};
use crate::core::error::ProtocolError;
use crate::protocol::{self, CHUNK_SIZE, ProtocolMessage};
use crate::transport::{PeerChannel, Polled};

/// The file currently being pumped to this connection
struct ActiveTransfer {
    entry: FileEntry,
    offset: u64,
}

enum Flow {
    Continue,
    Close,
}

pub(crate) async fn run(
    inner: Arc<SessionInner>,
    id: u64,
    record: Arc<Mutex<ConnectionRecord>>,
    mut channel: PeerChannel,
) {
    let mut transfer: Option<ActiveTransfer> = None;
    loop {
        let uploading = current_state(&record) == ConnectionState::Uploading;
        let frame = if uploading {
            // Drain control frames first; only an empty queue lets the
            // next chunk go out.
            match channel.poll_frame() {
                Polled::Frame(frame) => Some(frame),
                Polled::Closed => None,
                Polled::Empty => {
                    if let Err(e) = emit_chunk(&record, &mut transfer, &channel).await {
                        debug!(connection = id, error = %e, "chunk emission stopped");
                        mark_closed(&record);
                        break;
                    }
                    tokio::task::yield_now().await;
                    continue;
                }
            }
        } else {
            channel.recv().await
        };

        let Some(bytes) = frame else {
            mark_closed(&record);
            break;
        };
        let message = match protocol::decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(connection = id, error = %e, "closing connection on undecodable frame");
                mark_closed(&record);
                break;
            }
        };
        match handle_message(&inner, id, &record, &mut transfer, &channel, message).await {
            Flow::Continue => {}
            Flow::Close => break,
        }
    }
    inner.remove_connection(id).await;
}

async fn handle_message(
    inner: &SessionInner,
    id: u64,
    record: &Arc<Mutex<ConnectionRecord>>,
    transfer: &mut Option<ActiveTransfer>,
    channel: &PeerChannel,
    message: ProtocolMessage,
) -> Flow {
    use ConnectionState::*;

    let state = current_state(record);
    match (state, message) {
        (Pending, ProtocolMessage::RequestInfo(meta)) => {
            debug!(connection = id, browser = %meta.browser_name, "downloader introduced itself");
            set_record(record, |r| r.client = Some(meta));
            if inner.password.is_some() {
                let sent = channel
                    .send_message(&ProtocolMessage::PasswordRequired {
                        error_message: None,
                    })
                    .await;
                if sent.is_err() {
                    mark_closed(record);
                    return Flow::Close;
                }
                set_state(record, Authenticating);
            } else if send_catalog(inner, channel).await {
                set_state(record, Ready);
            } else {
                mark_closed(record);
                return Flow::Close;
            }
            Flow::Continue
        }

        (Authenticating | InvalidPassword, ProtocolMessage::UsePassword { password }) => {
            // Exact, case-sensitive match; attempts are unlimited and the
            // channel TTL bounds the exposure window.
            if inner.password.as_deref() == Some(password.as_str()) {
                if send_catalog(inner, channel).await {
                    set_state(record, Ready);
                } else {
                    mark_closed(record);
                    return Flow::Close;
                }
            } else {
                let sent = channel
                    .send_message(&ProtocolMessage::PasswordRequired {
                        error_message: Some("incorrect password".to_string()),
                    })
                    .await;
                if sent.is_err() {
                    mark_closed(record);
                    return Flow::Close;
                }
                set_state(record, InvalidPassword);
            }
            Flow::Continue
        }

        (Ready | Paused, ProtocolMessage::Start { file_name, offset }) => {
            match inner.find_file(&file_name) {
                Some(entry) if offset <= entry.info.size => {
                    let size = entry.info.size;
                    set_record(record, |r| {
                        r.state = Uploading;
                        r.current_file = Some(TransferCursor {
                            file_name: file_name.clone(),
                            offset,
                            size,
                        });
                    });
                    *transfer = Some(ActiveTransfer { entry, offset });
                    Flow::Continue
                }
                _ => {
                    warn!(
                        connection = id,
                        file_name, offset, "rejecting start for unknown file or bad offset"
                    );
                    mark_closed(record);
                    Flow::Close
                }
            }
        }

        (Uploading, ProtocolMessage::Pause) => {
            // Cancels exactly this connection's next emission step; the
            // cursor stays where it is until a Start resumes it.
            debug!(connection = id, "transfer paused");
            set_state(record, Paused);
            Flow::Continue
        }

        (Ready, ProtocolMessage::Done) => {
            info!(connection = id, "downloader finished, closing");
            set_state(record, Done);
            Flow::Close
        }

        (_, other) => {
            debug!(
                connection = id,
                state = ?state,
                tag = other.tag(),
                "ignoring out-of-state message"
            );
            Flow::Continue
        }
    }
}

/// Send one chunk and advance the cursor; on the final chunk the
/// connection drops back to `Ready`.
async fn emit_chunk(
    record: &Arc<Mutex<ConnectionRecord>>,
    transfer: &mut Option<ActiveTransfer>,
    channel: &PeerChannel,
) -> Result<(), ProtocolError> {
    let Some(active) = transfer.as_mut() else {
        // Uploading with nothing in flight; recover to Ready
        set_state(record, ConnectionState::Ready);
        return Ok(());
    };

    let size = active.entry.info.size;
    let end = min(size, active.offset + CHUNK_SIZE as u64);
    let len = (end - active.offset) as usize;
    let bytes = active.entry.source.read_range(active.offset, len).await?;
    if bytes.len() != len {
        return Err(ProtocolError::violation("file source returned a short read"));
    }
    let is_final = len < CHUNK_SIZE;

    channel
        .send_message(&ProtocolMessage::Chunk {
            file_name: active.entry.info.file_name.clone(),
            offset: active.offset,
            bytes,
            is_final,
        })
        .await?;
    active.offset = end;

    let file_name = active.entry.info.file_name.clone();
    set_record(record, |r| {
        r.current_file = Some(TransferCursor {
            file_name: file_name.clone(),
            offset: end,
            size,
        });
        if is_final {
            r.completed_file_count += 1;
            r.current_file = None;
            r.state = ConnectionState::Ready;
        }
    });
    if is_final {
        *transfer = None;
    }
    Ok(())
}

async fn send_catalog(inner: &SessionInner, channel: &PeerChannel) -> bool {
    channel
        .send_message(&ProtocolMessage::Info {
            files: inner.catalog(),
        })
        .await
        .is_ok()
}

fn current_state(record: &Arc<Mutex<ConnectionRecord>>) -> ConnectionState {
    match record.lock() {
        Ok(record) => record.state,
        Err(poisoned) => poisoned.into_inner().state,
    }
}

fn set_state(record: &Arc<Mutex<ConnectionRecord>>, state: ConnectionState) {
    set_record(record, |r| r.state = state);
}

fn set_record(record: &Arc<Mutex<ConnectionRecord>>, apply: impl FnOnce(&mut ConnectionRecord)) {
    let mut guard = match record.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    apply(&mut guard);
}

/// Transport closed (or we are closing it): terminal `Closed`, except that
/// `InvalidPassword` and `Done` are preserved.
fn mark_closed(record: &Arc<Mutex<ConnectionRecord>>) {
    set_record(record, |r| {
        if !r.state.preserved_on_close() {
            r.state = ConnectionState::Closed;
        }
    });
}
