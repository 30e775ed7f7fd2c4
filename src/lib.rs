pub mod config;
pub mod core;
pub mod directory;
pub mod protocol;
pub mod session;
pub mod slug;
pub mod transport;

// Re-export the pieces most callers and integration tests reach for
pub use crate::core::domain::{
    ChannelRecord, ClientMeta, ConnectionRecord, ConnectionState, FileEntry, FileInfo, PeerId,
    Slugs,
};
pub use crate::core::error::{DirectoryError, ProtocolError, StoreError};
pub use crate::core::source::{DiskSource, MemorySource};
pub use crate::directory::{ChannelDirectory, CreatedChannel};
pub use crate::session::downloader::{DownloadedFile, Downloader};
pub use crate::session::{ConnectionKind, UploaderSession};
