//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be wired into the engine.
//! Failures are opaque (`anyhow`); the engine decides whether they are
//! transient or can be absorbed.

use std::time::Duration;

use async_trait::async_trait;

use crate::models::{NewPost, Post, PostId, PostRange, UserId};

/// Durable persistence contract for posts.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Inserts the post; the store assigns the id and creation timestamp.
    async fn create_post(&self, post: NewPost) -> anyhow::Result<Post>;
    async fn get_post(&self, id: PostId) -> anyhow::Result<Option<Post>>;
    /// Bulk lookup. Result order is unspecified.
    async fn get_posts_by_ids(&self, ids: &[PostId]) -> anyhow::Result<Vec<Post>>;
    /// Id-descending page, honouring the exclusive `before` cursor.
    async fn list_posts(&self, range: PostRange) -> anyhow::Result<Vec<Post>>;
    /// Like count descending, id descending on ties.
    async fn top_posts_by_likes(&self, limit: u32) -> anyhow::Result<Vec<Post>>;
    async fn update_like_count(&self, id: PostId, count: u64) -> anyhow::Result<()>;
    /// Every known post id, used to seed the membership filter.
    async fn list_post_ids(&self) -> anyhow::Result<Vec<PostId>>;
}

/// Durable persistence contract for follow edges.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait FollowRepo: Send + Sync {
    /// Idempotent: following twice leaves a single edge.
    async fn follow(&self, follower: UserId, followee: UserId) -> anyhow::Result<()>;
    async fn unfollow(&self, follower: UserId, followee: UserId) -> anyhow::Result<()>;
    /// Users following `user`.
    async fn followers_of(&self, user: UserId) -> anyhow::Result<Vec<UserId>>;
    /// Users `user` follows.
    async fn following_of(&self, user: UserId) -> anyhow::Result<Vec<UserId>>;
}

/// A single step of an atomic cache batch.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheOp {
    Delete(String),
    Set {
        key: String,
        value: String,
        ttl: Option<Duration>,
    },
    ListPush {
        key: String,
        values: Vec<String>,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
}

/// Operations applied as one unit: no reader observes a partial batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheBatch {
    ops: Vec<CacheOp>,
}

impl CacheBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(CacheOp::Delete(key.into()));
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>, ttl: Option<Duration>) -> Self {
        self.ops.push(CacheOp::Set {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    pub fn list_push(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.ops.push(CacheOp::ListPush {
            key: key.into(),
            values,
        });
        self
    }

    pub fn expire(mut self, key: impl Into<String>, ttl: Duration) -> Self {
        self.ops.push(CacheOp::Expire { key: key.into(), ttl });
        self
    }

    pub fn ops(&self) -> &[CacheOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<CacheOp> {
        self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Ephemeral key-value store with set, sorted-set and list semantics.
///
/// Operations on a single key are serialized by the store itself.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    // Set operations
    async fn set_contains(&self, key: &str, member: &str) -> anyhow::Result<bool>;
    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()>;
    async fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<()>;
    async fn set_len(&self, key: &str) -> anyhow::Result<u64>;

    // Scalar operations
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()>;

    // Sorted-set operations
    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()>;
    /// Members with `min <= score < max_exclusive` (no upper bound when `None`),
    /// highest score first, at most `count` entries.
    async fn sorted_rev_range_by_score(
        &self,
        key: &str,
        max_exclusive: Option<f64>,
        min: f64,
        count: usize,
    ) -> anyhow::Result<Vec<(String, f64)>>;

    // List operations
    async fn list_push(&self, key: &str, values: &[String]) -> anyhow::Result<()>;
    /// Inclusive `start..=stop` slice, like LRANGE.
    async fn list_range(&self, key: &str, start: usize, stop: usize) -> anyhow::Result<Vec<String>>;

    // Key operations
    async fn exists(&self, key: &str) -> anyhow::Result<bool>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
    /// Every live key starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>>;

    /// Applies every op of the batch atomically.
    async fn execute(&self, batch: CacheBatch) -> anyhow::Result<()>;
}
