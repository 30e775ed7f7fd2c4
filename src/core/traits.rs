use async_trait::async_trait;

use super::domain::ChannelRecord;
use super::error::StoreError;

/// Polymorphic key/expiry store backing the channel directory.
///
/// A record is stored under both of its slugs and carries its own deadline.
/// Implementations must make an expired key indistinguishable from an absent
/// one: `get` never returns a record whose deadline has passed, however the
/// backend chooses to reap it.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Look up a live record by either slug
    async fn get(&self, slug: &str) -> Result<Option<ChannelRecord>, StoreError>;

    /// Insert or replace the record under both of its slugs, deadline included
    async fn put(&self, record: &ChannelRecord) -> Result<(), StoreError>;

    /// Remove the record addressed by either slug; absent keys are fine
    async fn delete(&self, slug: &str) -> Result<(), StoreError>;
}

/// Byte-range accessor for an offered file.
///
/// The session never loads whole files; chunk emission reads exactly the
/// range it is about to send.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn read_range(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>>;
}
