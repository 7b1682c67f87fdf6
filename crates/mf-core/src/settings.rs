//! # Engine Settings
//!
//! Tunables for the feed engine. Every field has a default so a partial
//! config file (or none at all) is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub bloom: BloomSettings,
    pub hot: HotSettings,
    pub invalidation: InvalidationSettings,
    pub reconcile: ReconcileSettings,
    pub feed: FeedSettings,
}

/// Sizing for the post membership filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    /// Expected number of posts
    pub capacity: usize,
    pub false_positive_rate: f64,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            false_positive_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotSettings {
    /// Hard cap on the cached hot list length
    pub top_n: u32,
    pub ttl_secs: u64,
    /// Upper bound (exclusive) of the random extra TTL
    pub jitter_secs: u64,
    /// TTL of the known-empty marker
    pub empty_ttl_secs: u64,
    pub refresh_interval_secs: u64,
    pub default_limit: u32,
}

impl Default for HotSettings {
    fn default() -> Self {
        Self {
            top_n: 100,
            ttl_secs: 60,
            jitter_secs: 30,
            empty_ttl_secs: 10,
            refresh_interval_secs: 60,
            default_limit: 10,
        }
    }
}

impl HotSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn empty_ttl(&self) -> Duration {
        Duration::from_secs(self.empty_ttl_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationSettings {
    /// Delay before the second delete of a double-delete
    pub second_delete_ms: u64,
}

impl Default for InvalidationSettings {
    fn default() -> Self {
        Self { second_delete_ms: 100 }
    }
}

impl InvalidationSettings {
    pub fn second_delete_delay(&self) -> Duration {
        Duration::from_millis(self.second_delete_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    pub interval_secs: u64,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl ReconcileSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Page size bounds for the public, pull and push feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl FeedSettings {
    /// Non-positive limits fall back to the default, oversized ones to the max.
    pub fn clamp(&self, limit: i64) -> u32 {
        clamp_limit(limit, self.default_limit, self.max_limit)
    }
}

pub(crate) fn clamp_limit(limit: i64, default: u32, max: u32) -> u32 {
    if limit <= 0 {
        default.min(max)
    } else if limit > i64::from(max) {
        max
    } else {
        limit as u32
    }
}

impl HotSettings {
    pub fn clamp(&self, limit: i64) -> u32 {
        clamp_limit(limit, self.default_limit, self.top_n)
    }
}
