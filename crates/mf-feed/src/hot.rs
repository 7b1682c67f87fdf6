//! # Hot Ranking Cache
//!
//! The most-liked posts, cached as an id list under `hot:posts`.
//!
//! States:
//! - *cold*: no list and no known-empty marker; the next read rebuilds.
//! - *warm*: list present until its TTL (base + random jitter) runs out.
//! - *known-empty*: the store has no posts; a short-lived marker stops
//!   every read from rescanning an empty table.
//!
//! Misses are single-flight: concurrent readers serialize on
//! `rebuild_lock`, re-check the cache once inside it, and only the first
//! one scans the durable store.

use std::sync::Arc;
use std::time::Duration;

use mf_core::error::{FeedError, Result};
use mf_core::keys;
use mf_core::models::{Post, PostId};
use mf_core::settings::HotSettings;
use mf_core::traits::{CacheBatch, CacheStore, PostRepo};
use rand::Rng;
use tokio::sync::Mutex;

use crate::reader::order_by_ids;

pub struct HotRankingCache {
    cache: Arc<dyn CacheStore>,
    posts: Arc<dyn PostRepo>,
    settings: HotSettings,
    rebuild_lock: Mutex<()>,
}

impl HotRankingCache {
    pub fn new(cache: Arc<dyn CacheStore>, posts: Arc<dyn PostRepo>, settings: HotSettings) -> Self {
        Self {
            cache,
            posts,
            settings,
            rebuild_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &HotSettings {
        &self.settings
    }

    /// Up to `limit` posts (clamped to `top_n`), most liked first.
    ///
    /// Cache failures never fail the call: they degrade to a rebuild or,
    /// failing that, a direct durable-store query.
    pub async fn get_hot_posts(&self, limit: i64) -> Result<Vec<Post>> {
        let limit = self.settings.clamp(limit);

        if self.known_empty().await {
            return Ok(Vec::new());
        }
        if let Some(ids) = self.cached_ids(limit).await {
            return self.resolve(ids).await;
        }

        let _guard = self.rebuild_lock.lock().await;

        // Another reader may have rebuilt while we waited.
        if let Some(ids) = self.cached_ids(limit).await {
            return self.resolve(ids).await;
        }
        if self.known_empty().await {
            return Ok(Vec::new());
        }

        match self.rebuild().await {
            Ok(mut posts) => {
                posts.truncate(limit as usize);
                Ok(posts)
            }
            Err(err) => {
                let degraded = FeedError::Degraded(format!("hot list rebuild failed: {err:#}"));
                tracing::warn!(error = %degraded, "serving hot posts straight from the store");
                self.posts
                    .top_posts_by_likes(limit)
                    .await
                    .map_err(FeedError::from)
            }
        }
    }

    /// Reloads the top-N from the durable store and replaces the cached
    /// list in one atomic batch. Returns the posts written.
    pub async fn rebuild(&self) -> anyhow::Result<Vec<Post>> {
        let posts = self.posts.top_posts_by_likes(self.settings.top_n).await?;

        let batch = CacheBatch::new().delete(keys::HOT_POSTS_EMPTY).delete(keys::HOT_POSTS);
        let batch = if posts.is_empty() {
            batch.set(keys::HOT_POSTS_EMPTY, "1", Some(self.settings.empty_ttl()))
        } else {
            let ids = posts.iter().map(|p| p.id.to_string()).collect();
            batch
                .list_push(keys::HOT_POSTS, ids)
                .expire(keys::HOT_POSTS, self.expiry())
        };
        self.cache.execute(batch).await?;

        tracing::debug!(count = posts.len(), "hot list rebuilt");
        Ok(posts)
    }

    /// Base TTL plus jitter, so lists built together do not expire together.
    fn expiry(&self) -> Duration {
        let jitter = if self.settings.jitter_secs == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.settings.jitter_secs)
        };
        self.settings.ttl() + Duration::from_secs(jitter)
    }

    async fn known_empty(&self) -> bool {
        self.cache.exists(keys::HOT_POSTS_EMPTY).await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "hot empty-marker check failed");
            false
        })
    }

    /// `None` on a miss; a cache error counts as a miss.
    async fn cached_ids(&self, limit: u32) -> Option<Vec<PostId>> {
        let raw = match self.cache.list_range(keys::HOT_POSTS, 0, limit.saturating_sub(1) as usize).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "hot list read failed");
                return None;
            }
        };
        if raw.is_empty() {
            return None;
        }
        Some(
            raw.iter()
                .filter_map(|s| s.parse::<PostId>().ok())
                .filter(|id| *id != 0)
                .collect(),
        )
    }

    async fn resolve(&self, ids: Vec<PostId>) -> Result<Vec<Post>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let posts = self.posts.get_posts_by_ids(&ids).await?;
        Ok(order_by_ids(&ids, posts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryRepo;
    use mf_cache_memory::MemoryCacheStore;
    use mf_core::traits::MockCacheStore;
    use std::sync::atomic::Ordering;

    fn settings() -> HotSettings {
        HotSettings {
            top_n: 5,
            ..HotSettings::default()
        }
    }

    fn hot_with(repo: Arc<MemoryRepo>, cache: Arc<dyn CacheStore>, settings: HotSettings) -> Arc<HotRankingCache> {
        Arc::new(HotRankingCache::new(cache, repo, settings))
    }

    #[tokio::test]
    async fn cold_read_rebuilds_then_serves_from_cache() {
        let repo = Arc::new(MemoryRepo::new());
        for likes in [3, 9, 1, 7] {
            repo.insert_with_likes(1, likes);
        }
        let cache = Arc::new(MemoryCacheStore::new());
        let hot = hot_with(repo.clone(), cache.clone(), settings());

        let first = hot.get_hot_posts(10).await.unwrap();
        assert_eq!(first.iter().map(|p| p.like_count).collect::<Vec<_>>(), vec![9, 7, 3, 1]);
        assert_eq!(repo.top_posts_calls.load(Ordering::SeqCst), 1);

        let second = hot.get_hot_posts(2).await.unwrap();
        assert_eq!(second.iter().map(|p| p.like_count).collect::<Vec<_>>(), vec![9, 7]);
        assert_eq!(repo.top_posts_calls.load(Ordering::SeqCst), 1, "warm read must not rescan");
    }

    #[tokio::test]
    async fn list_never_exceeds_top_n() {
        let repo = Arc::new(MemoryRepo::new());
        for likes in 0..20 {
            repo.insert_with_likes(1, likes);
        }
        let cache = Arc::new(MemoryCacheStore::new());
        let hot = hot_with(repo, cache.clone(), settings());

        let posts = hot.get_hot_posts(100).await.unwrap();
        assert_eq!(posts.len(), 5);
        assert!(posts.windows(2).all(|w| w[0].like_count >= w[1].like_count));
        assert_eq!(cache.list_range(keys::HOT_POSTS, 0, 1_000).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn concurrent_misses_trigger_a_single_rebuild() {
        let repo = Arc::new(MemoryRepo::new().with_top_posts_delay(Duration::from_millis(50)));
        for likes in [4, 2, 8] {
            repo.insert_with_likes(1, likes);
        }
        let cache = Arc::new(MemoryCacheStore::new());
        let hot = hot_with(repo.clone(), cache, settings());

        let readers: Vec<_> = (0..16)
            .map(|_| {
                let hot = Arc::clone(&hot);
                tokio::spawn(async move { hot.get_hot_posts(3).await })
            })
            .collect();
        for reader in readers {
            let posts = reader.await.unwrap().unwrap();
            assert_eq!(posts.iter().map(|p| p.like_count).collect::<Vec<_>>(), vec![8, 4, 2]);
        }

        assert_eq!(repo.top_posts_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_store_sets_short_lived_marker() {
        let repo = Arc::new(MemoryRepo::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let hot = hot_with(repo.clone(), cache.clone(), settings());

        assert!(hot.get_hot_posts(10).await.unwrap().is_empty());
        assert!(cache.exists(keys::HOT_POSTS_EMPTY).await.unwrap());

        // marker short-circuits further reads
        assert!(hot.get_hot_posts(10).await.unwrap().is_empty());
        assert_eq!(repo.top_posts_calls.load(Ordering::SeqCst), 1);

        // a later rebuild with data clears the marker
        repo.insert_with_likes(1, 1);
        hot.rebuild().await.unwrap();
        assert!(!cache.exists(keys::HOT_POSTS_EMPTY).await.unwrap());
        assert_eq!(hot.get_hot_posts(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rebuild_sets_ttl_within_jitter_window() {
        let repo = Arc::new(MemoryRepo::new());
        let hot = hot_with(repo, Arc::new(MemoryCacheStore::new()), settings());
        for _ in 0..50 {
            let ttl = hot.expiry();
            assert!(ttl >= Duration::from_secs(60) && ttl < Duration::from_secs(90), "{ttl:?}");
        }
    }

    #[tokio::test]
    async fn cache_outage_falls_back_to_direct_query() {
        let repo = Arc::new(MemoryRepo::new());
        for likes in [5, 6] {
            repo.insert_with_likes(2, likes);
        }

        let mut cache = MockCacheStore::new();
        cache.expect_exists().returning(|_| Err(anyhow::anyhow!("cache down")));
        cache
            .expect_list_range()
            .returning(|_, _, _| Err(anyhow::anyhow!("cache down")));
        cache
            .expect_execute()
            .returning(|_| Err(anyhow::anyhow!("cache down")));

        let hot = hot_with(repo.clone(), Arc::new(cache), settings());
        let posts = hot.get_hot_posts(1).await.unwrap();
        assert_eq!(posts.iter().map(|p| p.like_count).collect::<Vec<_>>(), vec![6]);
        // one scan for the failed rebuild, one for the fallback
        assert_eq!(repo.top_posts_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn store_failure_during_fallback_is_transient() {
        let repo = Arc::new(MemoryRepo::new());
        repo.fail_top_posts.store(true, Ordering::SeqCst);
        let hot = hot_with(repo, Arc::new(MemoryCacheStore::new()), settings());

        let err = hot.get_hot_posts(3).await.unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }
}
