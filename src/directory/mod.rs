pub mod store;

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use crate::core::domain::{ChannelRecord, PeerId, Slugs};
use crate::core::error::DirectoryError;
use crate::core::traits::ChannelStore;
use crate::slug::SlugGenerator;

/// Channel lifetime from creation or last renewal
pub const CHANNEL_TTL: Duration = Duration::from_secs(60 * 60);

/// Creation attempts before giving up on slug space
pub const MAX_SLUG_ATTEMPTS: usize = 8;

/// What `create` hands back to the session owner
#[derive(Debug, Clone)]
pub struct CreatedChannel {
    pub slugs: Slugs,
    pub secret: String,
    pub expires_at: SystemTime,
}

/// The slug-addressed channel directory.
///
/// Thin coordination layer over a [`ChannelStore`] and a [`SlugGenerator`]:
/// `create` and `renew` are gated by the owner secret, `destroy` is
/// deliberately open to anyone holding the slug, and `resolve` answers with
/// the owning peer id or a uniform not-found.
pub struct ChannelDirectory {
    store: Arc<dyn ChannelStore>,
    slugs: SlugGenerator,
    ttl: Duration,
    max_attempts: usize,
}

impl ChannelDirectory {
    pub fn new(store: Arc<dyn ChannelStore>) -> Self {
        Self {
            store,
            slugs: SlugGenerator::new(),
            ttl: CHANNEL_TTL,
            max_attempts: MAX_SLUG_ATTEMPTS,
        }
    }

    /// Override the TTL (tests use short lifetimes)
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Allocate a fresh channel record for `owner`.
    ///
    /// Retries slug generation a bounded number of times on collision, then
    /// fails with `ExhaustedSlugSpace`.
    pub async fn create(&self, owner: PeerId) -> Result<CreatedChannel, DirectoryError> {
        for attempt in 1..=self.max_attempts {
            let slugs = self.slugs.slugs();
            let taken = self.store.get(&slugs.short).await?.is_some()
                || self.store.get(&slugs.long).await?.is_some();
            if taken {
                debug!(attempt, short = %slugs.short, "slug collision, regenerating");
                continue;
            }

            let now = SystemTime::now();
            let record = ChannelRecord {
                slugs: slugs.clone(),
                owner: owner.clone(),
                secret: self.slugs.secret(),
                created_at: now,
                expires_at: now + self.ttl,
            };
            self.store.put(&record).await?;
            info!(short = %slugs.short, long = %slugs.long, owner = %owner, "channel created");
            return Ok(CreatedChannel {
                slugs,
                secret: record.secret,
                expires_at: record.expires_at,
            });
        }
        Err(DirectoryError::ExhaustedSlugSpace {
            attempts: self.max_attempts,
        })
    }

    /// Resolve either slug to the owning peer id.
    ///
    /// Absent and expired channels answer identically.
    pub async fn resolve(&self, slug: &str) -> Result<PeerId, DirectoryError> {
        match self.store.get(slug).await? {
            Some(record) => Ok(record.owner),
            None => Err(DirectoryError::NotFound),
        }
    }

    /// Push the deadline forward by one TTL. Requires the owner secret;
    /// idempotent before expiry.
    pub async fn renew(&self, slug: &str, secret: &str) -> Result<SystemTime, DirectoryError> {
        let mut record = self
            .store
            .get(slug)
            .await?
            .ok_or(DirectoryError::NotFound)?;
        if record.secret != secret {
            return Err(DirectoryError::Unauthorized);
        }
        record.expires_at = SystemTime::now() + self.ttl;
        self.store.put(&record).await?;
        debug!(slug, "channel renewed");
        Ok(record.expires_at)
    }

    /// Remove the channel. No secret required: anyone who has observed a
    /// slug (an abuse reporter, typically) may revoke it. Succeeds even if
    /// the channel is already gone.
    pub async fn destroy(&self, slug: &str) -> Result<(), DirectoryError> {
        self.store.delete(slug).await?;
        info!(slug, "channel destroyed");
        Ok(())
    }
}
