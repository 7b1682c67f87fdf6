//! # Domain Models
//!
//! These structs represent the entities the feed engine moves around.
//! Identifiers are durable-store assigned and monotonically increasing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PostId = u64;
pub type UserId = u64;

/// The fundamental unit of the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub content: String,
    /// Opaque media reference (URL or storage key)
    pub media_url: Option<String>,
    /// Cached derived value; the like ledger is authoritative until reconciled.
    pub like_count: u64,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Inbox score: creation time in whole seconds since the epoch.
    pub fn inbox_score(&self) -> f64 {
        self.created_at.timestamp() as f64
    }
}

/// A post as submitted by the author, before the store assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub author_id: UserId,
    pub content: String,
    pub media_url: Option<String>,
}

/// A directed (follower, followee) edge. Unique, never a self-edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Follow {
    pub follower_id: UserId,
    pub followee_id: UserId,
}

/// An id-descending window over the posts table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostRange {
    /// Exclusive upper bound on post id
    pub before: Option<PostId>,
    /// Restrict to these authors; `None` means every author
    pub authors: Option<Vec<UserId>>,
    /// Exclusive upper bound on creation time
    pub created_before: Option<DateTime<Utc>>,
    pub limit: u32,
}

/// The three shapes a reader can ask for, plus the hot list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    Public,
    Pull,
    Push,
    Hot,
}

/// One page of a feed together with the cursor for the next call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    /// `None` once there is nothing left to read.
    pub next_cursor: Option<String>,
}

impl FeedPage {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<PostId> {
        self.posts.iter().map(|p| p.id).collect()
    }
}

/// Result of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub like_count: u64,
}
