//! # Feed Engine
//!
//! Assembles the components around one set of stores and exposes the
//! operations an upstream caller needs: publishing, likes, follows and the
//! four feed shapes. Some of them leave detached follow-up work behind
//! (fan-out, delayed cache deletes, periodic jobs).

use std::sync::Arc;

use mf_core::error::{FeedError, Result};
use mf_core::models::{FeedMode, FeedPage, LikeOutcome, NewPost, Post, PostId, UserId};
use mf_core::settings::EngineSettings;
use mf_core::traits::{CacheStore, FollowRepo, PostRepo};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bloom::MembershipFilter;
use crate::fanout::{FanoutReport, InboxFanout};
use crate::hot::HotRankingCache;
use crate::invalidation::HotInvalidator;
use crate::jobs::spawn_periodic;
use crate::likes::LikeLedger;
use crate::reader::FeedReader;
use crate::reconcile::LikeReconciler;

pub struct FeedEngine {
    posts: Arc<dyn PostRepo>,
    follows: Arc<dyn FollowRepo>,
    filter: Arc<MembershipFilter>,
    invalidator: HotInvalidator,
    ledger: LikeLedger,
    reconciler: Arc<LikeReconciler>,
    hot: Arc<HotRankingCache>,
    fanout: Arc<InboxFanout>,
    reader: FeedReader,
    settings: EngineSettings,
}

impl FeedEngine {
    /// Wires every component and seeds the membership filter from the
    /// durable store. If seeding fails the engine still starts, with a
    /// filter that lets every id through.
    pub async fn bootstrap(
        posts: Arc<dyn PostRepo>,
        follows: Arc<dyn FollowRepo>,
        cache: Arc<dyn CacheStore>,
        settings: EngineSettings,
    ) -> Self {
        let filter = match posts.list_post_ids().await {
            Ok(ids) => {
                tracing::info!(count = ids.len(), "membership filter seeded");
                MembershipFilter::seeded(settings.bloom.clone(), ids)
            }
            Err(err) => {
                tracing::error!(error = %err, "membership filter seeding failed; filtering disabled");
                MembershipFilter::unseeded(settings.bloom.clone())
            }
        };
        Self::with_filter(posts, follows, cache, settings, Arc::new(filter))
    }

    pub fn with_filter(
        posts: Arc<dyn PostRepo>,
        follows: Arc<dyn FollowRepo>,
        cache: Arc<dyn CacheStore>,
        settings: EngineSettings,
        filter: Arc<MembershipFilter>,
    ) -> Self {
        let invalidator = HotInvalidator::new(cache.clone(), settings.invalidation.second_delete_delay());
        let hot = Arc::new(HotRankingCache::new(cache.clone(), posts.clone(), settings.hot.clone()));

        Self {
            ledger: LikeLedger::new(cache.clone(), posts.clone(), filter.clone(), invalidator.clone()),
            reconciler: Arc::new(LikeReconciler::new(cache.clone(), posts.clone(), invalidator.clone())),
            fanout: Arc::new(InboxFanout::new(cache.clone(), follows.clone())),
            reader: FeedReader::new(
                posts.clone(),
                follows.clone(),
                cache,
                hot.clone(),
                settings.feed.clone(),
            ),
            posts,
            follows,
            filter,
            invalidator,
            hot,
            settings,
        }
    }

    pub fn membership(&self) -> &MembershipFilter {
        &self.filter
    }

    pub fn reconciler(&self) -> &LikeReconciler {
        &self.reconciler
    }

    /// Stores a post and starts its fan-out. The handle resolves once
    /// every inbox insert has been attempted.
    pub async fn publish(&self, post: NewPost) -> Result<(Post, JoinHandle<FanoutReport>)> {
        if post.content.trim().is_empty() {
            return Err(FeedError::InvalidInput("post content is empty".to_string()));
        }

        // 1. Persistence: the store assigns id and timestamp
        let post = self.posts.create_post(post).await?;

        // 2. Membership: visible to the filter before anyone can like it
        self.filter.register(post.id);

        // 3. Hot list: drop the list and any known-empty marker
        self.invalidator.invalidate().await;

        // 4. Fan-out: detached, best effort
        let fanout = self.fanout.spawn_distribute(post.clone());

        tracing::info!(post_id = post.id, author_id = post.author_id, "post published");
        Ok((post, fanout))
    }

    pub async fn create_post(&self, author_id: UserId, content: String, media_url: Option<String>) -> Result<Post> {
        let (post, _fanout) = self
            .publish(NewPost {
                author_id,
                content,
                media_url,
            })
            .await?;
        Ok(post)
    }

    pub async fn toggle_like(&self, user: UserId, post: PostId) -> Result<LikeOutcome> {
        self.ledger.toggle(user, post).await
    }

    pub async fn like_count(&self, post: PostId) -> Result<u64> {
        self.ledger.count(post).await
    }

    pub async fn follow(&self, follower: UserId, followee: UserId) -> Result<()> {
        if follower == followee {
            return Err(FeedError::InvalidInput(format!("user {follower} cannot follow themselves")));
        }
        self.follows.follow(follower, followee).await?;
        tracing::debug!(follower, followee, "follow edge added");
        Ok(())
    }

    pub async fn unfollow(&self, follower: UserId, followee: UserId) -> Result<()> {
        self.follows.unfollow(follower, followee).await?;
        Ok(())
    }

    pub async fn list_feed(
        &self,
        mode: FeedMode,
        user: Option<UserId>,
        limit: i64,
        cursor: Option<&str>,
    ) -> Result<FeedPage> {
        self.reader.list(mode, user, limit, cursor).await
    }

    pub async fn list_hot(&self, limit: i64) -> Result<FeedPage> {
        self.reader.hot(limit).await
    }

    /// Starts the reconciler and the hot-list refresher. Both stop once
    /// `shutdown` flips to `true`.
    pub fn spawn_background_jobs(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let reconciler = Arc::clone(&self.reconciler);
        let reconcile = spawn_periodic(
            "like-reconciler",
            self.settings.reconcile.interval(),
            false,
            shutdown.clone(),
            move || {
                let reconciler = Arc::clone(&reconciler);
                async move {
                    if let Err(err) = reconciler.run_cycle().await {
                        tracing::warn!(error = %err, "reconciliation cycle failed");
                    }
                }
            },
        );

        let hot = Arc::clone(&self.hot);
        let refresh = spawn_periodic(
            "hot-refresh",
            self.settings.hot.refresh_interval(),
            true,
            shutdown,
            move || {
                let hot = Arc::clone(&hot);
                async move {
                    if let Err(err) = hot.rebuild().await {
                        tracing::warn!(error = %err, "hot list refresh failed");
                    }
                }
            },
        );

        vec![reconcile, refresh]
    }
}
