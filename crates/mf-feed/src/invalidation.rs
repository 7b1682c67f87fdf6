//! Double-delete invalidation of the hot list.
//!
//! The hot list and its known-empty marker are deleted once immediately,
//! so the next read rebuilds instead of seeing stale data, and once more
//! after a short delay to catch a reader that repopulated from pre-commit
//! data in between.

use std::sync::Arc;
use std::time::Duration;

use mf_core::keys;
use mf_core::traits::CacheStore;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct HotInvalidator {
    cache: Arc<dyn CacheStore>,
    delay: Duration,
}

impl HotInvalidator {
    pub fn new(cache: Arc<dyn CacheStore>, delay: Duration) -> Self {
        Self { cache, delay }
    }

    /// First delete. Failures are logged; the hot list TTL bounds staleness.
    pub async fn delete_now(&self) {
        for key in [keys::HOT_POSTS, keys::HOT_POSTS_EMPTY] {
            if let Err(err) = self.cache.delete(key).await {
                tracing::warn!(key, error = %err, "hot list delete failed");
            }
        }
    }

    /// Second delete, detached from the caller.
    pub fn delete_later(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.delay).await;
            this.delete_now().await;
        })
    }

    /// Both deletes. The returned handle resolves after the delayed one.
    pub async fn invalidate(&self) -> JoinHandle<()> {
        self.delete_now().await;
        self.delete_later()
    }
}
