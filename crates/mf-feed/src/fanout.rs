//! # Inbox Fan-out
//!
//! Fan-out-on-write: a new post is pushed into the inbox of its author and
//! of every follower, scored by creation second. Push feeds are only an
//! accelerator, so every failure here is logged and dropped.

use std::collections::BTreeSet;
use std::sync::Arc;

use mf_core::keys;
use mf_core::models::{Post, UserId};
use mf_core::traits::{CacheStore, FollowRepo};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct InboxFanout {
    cache: Arc<dyn CacheStore>,
    follows: Arc<dyn FollowRepo>,
}

impl InboxFanout {
    pub fn new(cache: Arc<dyn CacheStore>, follows: Arc<dyn FollowRepo>) -> Self {
        Self { cache, follows }
    }

    /// Author first, then followers in id order.
    async fn recipients(&self, post: &Post) -> Vec<UserId> {
        let followers = self.follows.followers_of(post.author_id).await.unwrap_or_else(|err| {
            tracing::warn!(
                post_id = post.id,
                author_id = post.author_id,
                error = %err,
                "follower lookup failed; delivering to author only"
            );
            Vec::new()
        });
        let followers: BTreeSet<UserId> = followers.into_iter().filter(|f| *f != post.author_id).collect();

        std::iter::once(post.author_id).chain(followers).collect()
    }

    pub async fn distribute(&self, post: &Post) -> FanoutReport {
        let member = post.id.to_string();
        let score = post.inbox_score();
        let mut report = FanoutReport::default();

        for user in self.recipients(post).await {
            match self.cache.sorted_add(&keys::inbox(user), &member, score).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(post_id = post.id, user_id = user, error = %err, "inbox insert failed");
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(post_id = post.id, ?report, "fan-out finished");
        report
    }

    /// Runs [`Self::distribute`] as a detached task.
    pub fn spawn_distribute(self: &Arc<Self>, post: Post) -> JoinHandle<FanoutReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.distribute(&post).await })
    }
}
