//! # Feed Reader
//!
//! Serves the four feed shapes:
//! - **Public**: every post, id descending, cursor = last id seen.
//! - **Pull**: same contract, restricted to the authors the reader follows.
//! - **Push**: the reader's precomputed inbox, score descending, cursor =
//!   last score seen (exclusive).
//! - **Hot**: delegated to the [`HotRankingCache`].
//!
//! Malformed cursors and out-of-range limits are clamped, never rejected.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mf_core::error::{FeedError, Result};
use mf_core::keys;
use mf_core::models::{FeedMode, FeedPage, Post, PostId, PostRange, UserId};
use mf_core::settings::FeedSettings;
use mf_core::traits::{CacheStore, FollowRepo, PostRepo};

use crate::hot::HotRankingCache;

/// Re-orders a bulk lookup result to follow `ids`. Ids the store did not
/// return are dropped.
pub(crate) fn order_by_ids(ids: &[PostId], posts: Vec<Post>) -> Vec<Post> {
    let mut by_id: HashMap<PostId, Post> = posts.into_iter().map(|p| (p.id, p)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Parses a public/pull cursor. Empty means "first page".
pub fn parse_id_cursor(raw: Option<&str>) -> Result<Option<PostId>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => match s.parse::<PostId>() {
            Ok(0) => Ok(None),
            Ok(id) => Ok(Some(id)),
            Err(_) => Err(FeedError::InvalidInput(format!("bad id cursor {s:?}"))),
        },
    }
}

/// Parses a push cursor (a score in seconds). Empty means "first page".
pub fn parse_score_cursor(raw: Option<&str>) -> Result<Option<f64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => match s.parse::<f64>() {
            Ok(score) if score.is_finite() => Ok(Some(score)),
            _ => Err(FeedError::InvalidInput(format!("bad score cursor {s:?}"))),
        },
    }
}

/// Logs and drops an unusable cursor so the request still succeeds.
fn lenient<T>(parsed: Result<Option<T>>) -> Option<T> {
    parsed.unwrap_or_else(|err| {
        tracing::debug!(error = %err, "ignoring cursor");
        None
    })
}

fn format_score(score: f64) -> String {
    format!("{score:.0}")
}

pub struct FeedReader {
    posts: Arc<dyn PostRepo>,
    follows: Arc<dyn FollowRepo>,
    cache: Arc<dyn CacheStore>,
    hot: Arc<HotRankingCache>,
    settings: FeedSettings,
}

impl FeedReader {
    pub fn new(
        posts: Arc<dyn PostRepo>,
        follows: Arc<dyn FollowRepo>,
        cache: Arc<dyn CacheStore>,
        hot: Arc<HotRankingCache>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            posts,
            follows,
            cache,
            hot,
            settings,
        }
    }

    pub async fn list(&self, mode: FeedMode, user: Option<UserId>, limit: i64, cursor: Option<&str>) -> Result<FeedPage> {
        match mode {
            FeedMode::Public => self.public(limit, cursor).await,
            FeedMode::Pull => self.pull(require_user(user)?, limit, cursor).await,
            FeedMode::Push => self.push(require_user(user)?, limit, cursor).await,
            FeedMode::Hot => self.hot(limit).await,
        }
    }

    pub async fn public(&self, limit: i64, cursor: Option<&str>) -> Result<FeedPage> {
        let range = PostRange {
            before: lenient(parse_id_cursor(cursor)),
            limit: self.settings.clamp(limit),
            ..PostRange::default()
        };
        self.id_page(range).await
    }

    pub async fn pull(&self, user: UserId, limit: i64, cursor: Option<&str>) -> Result<FeedPage> {
        let following = self.follows.following_of(user).await?;
        if following.is_empty() {
            return Ok(FeedPage::empty());
        }
        let range = PostRange {
            before: lenient(parse_id_cursor(cursor)),
            authors: Some(following),
            limit: self.settings.clamp(limit),
            ..PostRange::default()
        };
        self.id_page(range).await
    }

    pub async fn push(&self, user: UserId, limit: i64, cursor: Option<&str>) -> Result<FeedPage> {
        let limit = self.settings.clamp(limit);
        let max_score = lenient(parse_score_cursor(cursor));

        let entries = match self
            .cache
            .sorted_rev_range_by_score(&keys::inbox(user), max_score, 0.0, limit as usize)
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                let degraded = FeedError::Degraded(format!("inbox read failed: {err:#}"));
                tracing::warn!(user_id = user, error = %degraded, "serving push feed from follow edges");
                return self.push_fallback(user, limit, max_score).await;
            }
        };

        // The cursor follows the last entry read, parsed or not, so a page
        // of junk members still points at the entries below it.
        let last_score = entries.last().map(|(_, score)| *score);
        let mut ids = Vec::with_capacity(entries.len());
        for (member, _) in entries {
            match member.parse::<PostId>() {
                Ok(id) if id != 0 => ids.push(id),
                _ => tracing::debug!(user_id = user, member, "skipping malformed inbox member"),
            }
        }

        let posts = if ids.is_empty() {
            Vec::new()
        } else {
            order_by_ids(&ids, self.posts.get_posts_by_ids(&ids).await?)
        };
        Ok(FeedPage {
            posts,
            next_cursor: last_score.map(format_score),
        })
    }

    pub async fn hot(&self, limit: i64) -> Result<FeedPage> {
        Ok(FeedPage {
            posts: self.hot.get_hot_posts(limit).await?,
            next_cursor: None,
        })
    }

    /// Pull-style read over the reader's followees plus the reader, keeping
    /// the push cursor contract (scores are creation seconds).
    async fn push_fallback(&self, user: UserId, limit: u32, max_score: Option<f64>) -> Result<FeedPage> {
        let mut authors = self.follows.following_of(user).await?;
        authors.push(user);
        let created_before = max_score.and_then(|s| DateTime::<Utc>::from_timestamp(s as i64, 0));

        let posts = self
            .posts
            .list_posts(PostRange {
                authors: Some(authors),
                created_before,
                limit,
                ..PostRange::default()
            })
            .await?;
        let next_cursor = posts.last().map(|p| format_score(p.inbox_score()));
        Ok(FeedPage { posts, next_cursor })
    }

    async fn id_page(&self, range: PostRange) -> Result<FeedPage> {
        let posts = self.posts.list_posts(range).await?;
        let next_cursor = posts.last().map(|p| p.id.to_string());
        Ok(FeedPage { posts, next_cursor })
    }
}

fn require_user(user: Option<UserId>) -> Result<UserId> {
    user.ok_or_else(|| FeedError::InvalidInput("this feed needs a user".to_string()))
}
