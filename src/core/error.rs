use thiserror::Error;

/// Errors from a channel store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored record is corrupt: {0}")]
    Codec(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Codec(e.to_string())
    }
}

/// Errors surfaced by the channel directory.
///
/// `NotFound` deliberately covers both "never existed" and "expired" so
/// callers cannot probe whether a slug was ever live.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("channel not found")]
    NotFound,
    #[error("invalid channel secret")]
    Unauthorized,
    #[error("slug space exhausted after {attempts} attempts")]
    ExhaustedSlugSpace { attempts: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors on a single peer connection.
///
/// None of these ever propagate beyond the connection they occurred on.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed frame, unknown tag, or invalid file name / offset
    #[error("protocol violation: {0}")]
    Violation(String),
    /// The peer channel closed; a normal terminal condition
    #[error("peer channel closed")]
    Closed,
    /// The uploader demands a password and none was configured
    #[error("password required by uploader")]
    PasswordRequired,
    #[error("password rejected: {0}")]
    PasswordRejected(String),
    /// The share was reported and every connection force-closed
    #[error("transfer was reported and shut down")]
    Reported,
    #[error("file source i/o: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn violation(msg: impl Into<String>) -> Self {
        ProtocolError::Violation(msg.into())
    }
}
