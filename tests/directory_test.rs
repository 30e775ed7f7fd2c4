use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use droplink::core::domain::{ChannelRecord, PeerId, Slugs};
use droplink::core::error::{DirectoryError, StoreError};
use droplink::core::traits::ChannelStore;
use droplink::directory::ChannelDirectory;
use droplink::directory::store::{MemoryChannelStore, SledChannelStore};

fn directory_with_ttl(ttl: Duration) -> ChannelDirectory {
    ChannelDirectory::new(Arc::new(MemoryChannelStore::new())).with_ttl(ttl)
}

#[tokio::test]
async fn create_then_resolve_by_either_slug() {
    let directory = directory_with_ttl(Duration::from_secs(60));
    let owner = PeerId::new("uploader-1");
    let created = directory.create(owner.clone()).await.unwrap();

    assert_eq!(directory.resolve(&created.slugs.short).await.unwrap(), owner);
    assert_eq!(directory.resolve(&created.slugs.long).await.unwrap(), owner);
    assert!(created.expires_at > SystemTime::now());
}

#[tokio::test]
async fn resolve_unknown_slug_is_not_found() {
    let directory = directory_with_ttl(Duration::from_secs(60));
    let err = directory.resolve("zzzz99").await.unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound));
}

#[tokio::test]
async fn expired_channel_is_indistinguishable_from_absent() {
    let directory = directory_with_ttl(Duration::from_millis(80));
    let created = directory.create(PeerId::new("uploader-1")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let err = directory.resolve(&created.slugs.short).await.unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound));
    let err = directory.resolve("never-existed-slug").await.unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound));
}

#[tokio::test]
async fn renew_before_expiry_keeps_the_channel_alive() {
    let directory = directory_with_ttl(Duration::from_millis(500));
    let created = directory.create(PeerId::new("uploader-1")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let new_expiry = directory
        .renew(&created.slugs.short, &created.secret)
        .await
        .unwrap();
    assert!(new_expiry > created.expires_at);

    // past the original deadline, inside the renewed one
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(directory.resolve(&created.slugs.short).await.is_ok());
    assert!(directory.resolve(&created.slugs.long).await.is_ok());

    tokio::time::sleep(Duration::from_millis(600)).await;
    let err = directory.resolve(&created.slugs.short).await.unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound));
}

#[tokio::test]
async fn renew_is_idempotent() {
    let directory = directory_with_ttl(Duration::from_secs(60));
    let created = directory.create(PeerId::new("uploader-1")).await.unwrap();

    let first = directory
        .renew(&created.slugs.short, &created.secret)
        .await
        .unwrap();
    let second = directory
        .renew(&created.slugs.long, &created.secret)
        .await
        .unwrap();
    assert!(second >= first);
    assert!(directory.resolve(&created.slugs.short).await.is_ok());
}

#[tokio::test]
async fn renew_with_wrong_secret_is_unauthorized() {
    let directory = directory_with_ttl(Duration::from_secs(60));
    let created = directory.create(PeerId::new("uploader-1")).await.unwrap();

    let err = directory
        .renew(&created.slugs.short, "not-the-secret")
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::Unauthorized));
    // no state mutation: the channel still resolves
    assert!(directory.resolve(&created.slugs.short).await.is_ok());
}

#[tokio::test]
async fn renew_after_expiry_is_not_found() {
    let directory = directory_with_ttl(Duration::from_millis(50));
    let created = directory.create(PeerId::new("uploader-1")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    let err = directory
        .renew(&created.slugs.short, &created.secret)
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound));
}

#[tokio::test]
async fn destroy_requires_no_secret_and_always_succeeds() {
    let directory = directory_with_ttl(Duration::from_secs(60));
    let created = directory.create(PeerId::new("uploader-1")).await.unwrap();

    // any caller may destroy: no secret in the signature at all
    directory.destroy(&created.slugs.long).await.unwrap();
    let err = directory.resolve(&created.slugs.short).await.unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound));

    // destroying again, or destroying something absent, still succeeds
    directory.destroy(&created.slugs.long).await.unwrap();
    directory.destroy("never-existed-slug").await.unwrap();
}

/// Wraps a real store and pretends the first looked-up slug is taken,
/// forcing `create` onto its collision-retry path.
struct FirstLookupCollides {
    inner: MemoryChannelStore,
    force: AtomicBool,
}

impl FirstLookupCollides {
    fn new() -> Self {
        Self {
            inner: MemoryChannelStore::new(),
            force: AtomicBool::new(true),
        }
    }

    fn squatter(slug: &str) -> ChannelRecord {
        let now = SystemTime::now();
        ChannelRecord {
            slugs: Slugs {
                short: slug.to_string(),
                long: slug.to_string(),
            },
            owner: PeerId::new("squatter"),
            secret: "beef".to_string(),
            created_at: now,
            expires_at: now + Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl ChannelStore for FirstLookupCollides {
    async fn get(&self, slug: &str) -> Result<Option<ChannelRecord>, StoreError> {
        if self.force.swap(false, Ordering::SeqCst) {
            return Ok(Some(Self::squatter(slug)));
        }
        self.inner.get(slug).await
    }

    async fn put(&self, record: &ChannelRecord) -> Result<(), StoreError> {
        self.inner.put(record).await
    }

    async fn delete(&self, slug: &str) -> Result<(), StoreError> {
        self.inner.delete(slug).await
    }
}

#[tokio::test]
async fn create_survives_a_forced_first_attempt_collision() {
    let directory = ChannelDirectory::new(Arc::new(FirstLookupCollides::new()));

    let first = directory.create(PeerId::new("uploader-1")).await.unwrap();
    let second = directory.create(PeerId::new("uploader-2")).await.unwrap();

    assert_ne!(first.slugs.short, second.slugs.short);
    assert_ne!(first.slugs.long, second.slugs.long);
    assert_ne!(first.secret, second.secret);
    assert_eq!(
        directory.resolve(&first.slugs.short).await.unwrap(),
        PeerId::new("uploader-1")
    );
    assert_eq!(
        directory.resolve(&second.slugs.short).await.unwrap(),
        PeerId::new("uploader-2")
    );
}

/// Store where every slug is always taken
struct SaturatedStore;

#[async_trait]
impl ChannelStore for SaturatedStore {
    async fn get(&self, slug: &str) -> Result<Option<ChannelRecord>, StoreError> {
        Ok(Some(FirstLookupCollides::squatter(slug)))
    }

    async fn put(&self, _record: &ChannelRecord) -> Result<(), StoreError> {
        Ok(())
    }

    async fn delete(&self, _slug: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn create_fails_when_slug_space_is_exhausted() {
    let directory = ChannelDirectory::new(Arc::new(SaturatedStore));
    let err = directory.create(PeerId::new("uploader-1")).await.unwrap_err();
    assert!(matches!(err, DirectoryError::ExhaustedSlugSpace { .. }));
}

#[tokio::test]
async fn sled_backed_directory_behaves_like_the_memory_one() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledChannelStore::open(dir.path()).unwrap();
    let directory = ChannelDirectory::new(Arc::new(store)).with_ttl(Duration::from_millis(200));
    let owner = PeerId::new("uploader-1");

    let created = directory.create(owner.clone()).await.unwrap();
    assert_eq!(directory.resolve(&created.slugs.long).await.unwrap(), owner);

    directory
        .renew(&created.slugs.short, &created.secret)
        .await
        .unwrap();

    directory.destroy(&created.slugs.short).await.unwrap();
    let err = directory.resolve(&created.slugs.long).await.unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound));

    let short_lived = directory.create(owner).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    let err = directory
        .resolve(&short_lived.slugs.short)
        .await
        .unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound));
}
