pub mod connection;
pub mod downloader;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::domain::{ConnectionRecord, ConnectionState, FileEntry, FileInfo};
use crate::directory::ChannelDirectory;
use crate::protocol::{self, ProtocolMessage};
use crate::transport::{ChannelSender, PeerChannel};

/// How long a `Report` frame may wait for space in a sibling's outbound
/// buffer before delivery is abandoned
const REPORT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// How an attached connection should be treated. The signaling layer tells
/// us which kind it negotiated; report channels never enter the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Transfer,
    Report,
}

pub(crate) struct ConnectionHandle {
    pub(crate) id: u64,
    pub(crate) record: Arc<StdMutex<ConnectionRecord>>,
    pub(crate) outbound: ChannelSender,
    pub(crate) task: JoinHandle<()>,
}

pub(crate) struct SessionInner {
    pub(crate) files: Vec<FileEntry>,
    pub(crate) password: Option<String>,
    connections: Mutex<Vec<ConnectionHandle>>,
    halted: AtomicBool,
    next_id: AtomicU64,
}

impl SessionInner {
    pub(crate) fn find_file(&self, name: &str) -> Option<FileEntry> {
        self.files.iter().find(|f| f.info.file_name == name).cloned()
    }

    pub(crate) fn catalog(&self) -> Vec<FileInfo> {
        self.files.iter().map(|f| f.info.clone()).collect()
    }

    pub(crate) async fn remove_connection(&self, id: u64) {
        let mut connections = self.connections.lock().await;
        connections.retain(|handle| handle.id != id);
    }
}

/// Owner of the offered file catalog and every active downloader
/// connection on the uploading side.
///
/// Each attached channel gets its own task running the per-connection
/// state machine; the session keeps only a handle (shared record, outbound
/// sender, join handle) so a report can reach and close every sibling.
pub struct UploaderSession {
    inner: Arc<SessionInner>,
}

impl UploaderSession {
    /// Session with an open catalog
    pub fn new(files: Vec<FileEntry>) -> Self {
        Self::build(files, None)
    }

    /// Session whose catalog sits behind a shared password
    pub fn protected(files: Vec<FileEntry>, password: impl Into<String>) -> Self {
        Self::build(files, Some(password.into()))
    }

    fn build(files: Vec<FileEntry>, password: Option<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                files,
                password,
                connections: Mutex::new(Vec::new()),
                halted: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Hand a freshly opened peer channel to the session.
    ///
    /// Transfer channels get a connection record and a state-machine task.
    /// A report channel triggers the kill switch instead: `Report` goes out
    /// to every open sibling, everything closes, and the session stops
    /// accepting further channels. A halted session closes new channels
    /// immediately.
    pub async fn attach(&self, channel: PeerChannel, kind: ConnectionKind) {
        if self.inner.halted.load(Ordering::SeqCst) {
            debug!("session halted, refusing new connection");
            channel.close();
            return;
        }
        match kind {
            ConnectionKind::Report => {
                self.handle_report().await;
                channel.close();
            }
            ConnectionKind::Transfer => {
                let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
                let record = Arc::new(StdMutex::new(ConnectionRecord::new(
                    id,
                    self.inner.files.len(),
                )));
                let outbound = channel.sender();

                let mut connections = self.inner.connections.lock().await;
                if self.inner.halted.load(Ordering::SeqCst) {
                    channel.close();
                    return;
                }
                let task = tokio::spawn(connection::run(
                    Arc::clone(&self.inner),
                    id,
                    Arc::clone(&record),
                    channel,
                ));
                connections.push(ConnectionHandle {
                    id,
                    record,
                    outbound,
                    task,
                });
                info!(connection = id, "downloader connection attached");
            }
        }
    }

    async fn handle_report(&self) {
        self.inner.halted.store(true, Ordering::SeqCst);
        let drained: Vec<ConnectionHandle> = {
            let mut connections = self.inner.connections.lock().await;
            connections.drain(..).collect()
        };
        warn!(
            connections = drained.len(),
            "abuse report received, closing all connections"
        );
        let frame = match protocol::encode(&ProtocolMessage::Report) {
            Ok(frame) => frame,
            Err(_) => return,
        };
        for handle in drained {
            // Abort the pump first so chunk traffic stops competing for the
            // outbound buffer, then deliver Report from its own task. A full
            // buffer delays the frame until the peer drains; it is not
            // dropped.
            handle.task.abort();
            let outbound = handle.outbound;
            let report = frame.clone();
            tokio::spawn(async move {
                match tokio::time::timeout(REPORT_DELIVERY_TIMEOUT, outbound.send(report)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => debug!("peer gone before report delivery"),
                    Err(_) => warn!("report delivery timed out on a stalled peer"),
                }
            });
            let mut record = match handle.record.lock() {
                Ok(record) => record,
                Err(poisoned) => poisoned.into_inner(),
            };
            if !record.state.preserved_on_close() {
                record.state = ConnectionState::Closed;
            }
        }
    }

    /// Whether the kill switch has fired
    pub fn is_halted(&self) -> bool {
        self.inner.halted.load(Ordering::SeqCst)
    }

    /// Snapshot of every live connection's record, for status display
    pub async fn connection_records(&self) -> Vec<ConnectionRecord> {
        let connections = self.inner.connections.lock().await;
        connections
            .iter()
            .filter_map(|handle| handle.record.lock().ok().map(|r| r.clone()))
            .collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.connections.lock().await.len()
    }

    /// Spawn the periodic directory renewal. Runs until the returned handle
    /// is aborted; the period is independent of transfer activity.
    pub fn start_renewal(
        &self,
        directory: Arc<ChannelDirectory>,
        slug: String,
        secret: String,
        every: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // the immediate first tick would renew right after create
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match directory.renew(&slug, &secret).await {
                    Ok(expires_at) => debug!(slug, ?expires_at, "channel renewed"),
                    Err(e) => warn!(slug, error = %e, "channel renewal failed"),
                }
            }
        })
    }

    /// Tear the session down: stop accepting channels and close every
    /// connection.
    pub async fn close(&self) {
        self.inner.halted.store(true, Ordering::SeqCst);
        let drained: Vec<ConnectionHandle> = {
            let mut connections = self.inner.connections.lock().await;
            connections.drain(..).collect()
        };
        for handle in drained {
            handle.task.abort();
            if let Ok(mut record) = handle.record.lock() {
                if !record.state.preserved_on_close() {
                    record.state = ConnectionState::Closed;
                }
            }
        }
    }
}

/// Best-effort directory cleanup at session teardown. Failures are logged
/// and dropped; the TTL reaps the record anyway.
pub async fn release_channel(directory: &ChannelDirectory, slug: &str) {
    if let Err(e) = directory.destroy(slug).await {
        debug!(slug, error = %e, "best-effort channel destroy failed");
    }
}
