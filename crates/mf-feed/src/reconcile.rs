//! # Like Reconciliation
//!
//! Copies every `like_count:<post>` slot into the durable store. The slot
//! is never cleared, so a failed write is simply retried on the next cycle
//! and a crash mid-cycle loses nothing.

use std::sync::Arc;

use mf_core::error::Result;
use mf_core::keys;
use mf_core::models::PostId;
use mf_core::traits::{CacheStore, PostRepo};

use crate::invalidation::HotInvalidator;

/// Outcome counters for one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Keys returned by the prefix scan
    pub scanned: usize,
    pub synced: usize,
    /// Malformed keys or slots that vanished between scan and read
    pub skipped: usize,
    pub failed: usize,
}

pub struct LikeReconciler {
    cache: Arc<dyn CacheStore>,
    posts: Arc<dyn PostRepo>,
    invalidator: HotInvalidator,
}

impl LikeReconciler {
    pub fn new(cache: Arc<dyn CacheStore>, posts: Arc<dyn PostRepo>, invalidator: HotInvalidator) -> Self {
        Self {
            cache,
            posts,
            invalidator,
        }
    }

    /// One pass over every outstanding counter.
    ///
    /// Only the key scan can fail the cycle; per-entry failures are logged,
    /// counted and left for the next tick.
    pub async fn run_cycle(&self) -> Result<ReconcileReport> {
        let counter_keys = self.cache.scan_prefix(keys::LIKE_COUNT_PREFIX).await?;
        let mut report = ReconcileReport {
            scanned: counter_keys.len(),
            ..ReconcileReport::default()
        };

        for key in counter_keys {
            let Some(post_id) = keys::parse_like_count_key(&key) else {
                tracing::debug!(key, "skipping malformed like counter key");
                report.skipped += 1;
                continue;
            };
            match self.sync_one(&key, post_id).await {
                Ok(true) => report.synced += 1,
                Ok(false) => report.skipped += 1,
                Err(err) => {
                    tracing::warn!(post_id, error = %err, "like count write-back failed");
                    report.failed += 1;
                }
            }
        }

        if report.failed > 0 {
            tracing::warn!(?report, "reconciliation cycle finished with failures");
        } else {
            tracing::debug!(?report, "reconciliation cycle finished");
        }
        Ok(report)
    }

    /// `Ok(false)` when there was nothing to write.
    async fn sync_one(&self, key: &str, post_id: PostId) -> anyhow::Result<bool> {
        let Some(raw) = self.cache.get(key).await? else {
            return Ok(false);
        };
        let count: u64 = raw
            .parse()
            .map_err(|err| anyhow::anyhow!("counter {key} holds {raw:?}: {err}"))?;

        self.invalidator.delete_now().await;
        self.posts.update_like_count(post_id, count).await?;
        self.invalidator.delete_later();
        Ok(true)
    }
}
