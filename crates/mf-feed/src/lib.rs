//! minifeed/crates/mf-feed/src/lib.rs
//!
//! The feed fan-out and adaptive caching engine. Everything here talks to
//! storage through the `mf-core` ports, so any plugin combination works.

pub mod bloom;
pub mod engine;
pub mod fanout;
pub mod hot;
pub mod invalidation;
pub mod jobs;
pub mod likes;
pub mod reader;
pub mod reconcile;

#[cfg(test)]
pub(crate) mod test_support;

pub use bloom::MembershipFilter;
pub use engine::FeedEngine;
pub use fanout::{FanoutReport, InboxFanout};
pub use hot::HotRankingCache;
pub use invalidation::HotInvalidator;
pub use likes::LikeLedger;
pub use reader::FeedReader;
pub use reconcile::{LikeReconciler, ReconcileReport};
