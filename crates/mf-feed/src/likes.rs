//! # Like Ledger
//!
//! `like:<post>` holds the set of likers and is the authoritative count
//! until the reconciler flushes it. `like_count:<post>` is a fast-read copy
//! of the set's cardinality, rewritten on every toggle and never adjusted
//! by a delta.

use std::sync::Arc;

use mf_core::error::{FeedError, Result};
use mf_core::keys;
use mf_core::models::{LikeOutcome, PostId, UserId};
use mf_core::traits::{CacheStore, PostRepo};

use crate::bloom::MembershipFilter;
use crate::invalidation::HotInvalidator;

pub struct LikeLedger {
    cache: Arc<dyn CacheStore>,
    posts: Arc<dyn PostRepo>,
    filter: Arc<MembershipFilter>,
    invalidator: HotInvalidator,
}

impl LikeLedger {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        posts: Arc<dyn PostRepo>,
        filter: Arc<MembershipFilter>,
        invalidator: HotInvalidator,
    ) -> Self {
        Self {
            cache,
            posts,
            filter,
            invalidator,
        }
    }

    /// Flips `user`'s like on `post` and returns the new state and count.
    pub async fn toggle(&self, user: UserId, post: PostId) -> Result<LikeOutcome> {
        self.ensure_exists(post).await?;

        self.invalidator.delete_now().await;

        let set_key = keys::like_set(post);
        let member = user.to_string();
        let liked = if self.cache.set_contains(&set_key, &member).await? {
            self.cache.set_remove(&set_key, &member).await?;
            false
        } else {
            self.cache.set_add(&set_key, &member).await?;
            true
        };

        let like_count = self.cache.set_len(&set_key).await?;
        self.cache
            .set(&keys::like_count(post), &like_count.to_string(), None)
            .await?;

        self.invalidator.delete_later();

        tracing::debug!(user_id = user, post_id = post, liked, like_count, "like toggled");
        Ok(LikeOutcome { liked, like_count })
    }

    /// Current count: fast-read slot, then the set itself.
    pub async fn count(&self, post: PostId) -> Result<u64> {
        if let Some(raw) = self.cache.get(&keys::like_count(post)).await? {
            match raw.parse::<u64>() {
                Ok(count) => return Ok(count),
                Err(_) => tracing::warn!(post_id = post, raw, "unparseable like counter"),
            }
        }
        Ok(self.cache.set_len(&keys::like_set(post)).await?)
    }

    async fn ensure_exists(&self, post: PostId) -> Result<()> {
        if !self.filter.may_exist(post) {
            return Err(FeedError::post_not_found(post));
        }
        match self.posts.get_post(post).await? {
            Some(_) => Ok(()),
            None => Err(FeedError::post_not_found(post)),
        }
    }
}
