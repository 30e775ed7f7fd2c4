use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use uuid::Uuid;

use super::traits::FileSource;

/// Opaque identifier of a peer, as handed out by the signaling layer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random peer id (used by the CLI and tests)
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two human-shareable identifiers minted for a channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slugs {
    pub short: String,
    pub long: String,
}

/// Directory entry binding slug space to an uploader's peer id.
///
/// Exists iff `expires_at > now`. Only `expires_at` changes after creation,
/// and only through `renew`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub slugs: Slugs,
    pub owner: PeerId,
    /// Opaque capability token required by `renew`
    pub secret: String,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
}

impl ChannelRecord {
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

/// Advisory client metadata sent by a downloader when it introduces itself
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientMeta {
    pub browser_name: String,
    pub browser_version: String,
    pub os_name: String,
    pub os_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_model: Option<String>,
}

/// Catalog entry as advertised on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileInfo {
    pub file_name: String,
    pub size: u64,
    pub mime_type: String,
}

/// A file offered by the uploader session: wire metadata plus the
/// byte-range accessor serving its content. Immutable for the session.
#[derive(Clone)]
pub struct FileEntry {
    pub info: FileInfo,
    pub source: Arc<dyn FileSource>,
}

impl FileEntry {
    pub fn new(info: FileInfo, source: Arc<dyn FileSource>) -> Self {
        Self { info, source }
    }
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry").field("info", &self.info).finish()
    }
}

/// Per-connection protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Pending,
    Authenticating,
    InvalidPassword,
    Ready,
    Uploading,
    Paused,
    Done,
    Closed,
}

impl ConnectionState {
    /// States that survive a transport close instead of becoming `Closed`
    pub fn preserved_on_close(self) -> bool {
        matches!(self, ConnectionState::InvalidPassword | ConnectionState::Done)
    }
}

/// Position inside the file currently being sent on a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCursor {
    pub file_name: String,
    pub offset: u64,
    pub size: u64,
}

impl TransferCursor {
    /// Fraction of the current file already emitted, in `[0, 1]`
    pub fn progress(&self) -> f32 {
        if self.size == 0 {
            1.0
        } else {
            self.offset as f32 / self.size as f32
        }
    }
}

/// Bookkeeping for one open downloader connection.
///
/// Created when the channel is attached, removed when it closes. Owned by
/// the uploader session and never shared across connections.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub id: u64,
    pub state: ConnectionState,
    pub client: Option<ClientMeta>,
    pub completed_file_count: usize,
    pub total_file_count: usize,
    pub current_file: Option<TransferCursor>,
}

impl ConnectionRecord {
    pub fn new(id: u64, total_file_count: usize) -> Self {
        Self {
            id,
            state: ConnectionState::Pending,
            client: None,
            completed_file_count: 0,
            total_file_count,
            current_file: None,
        }
    }
}
