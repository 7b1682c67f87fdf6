//! Shared wiring: a fresh SQLite `:memory:` store plus the in-process cache.

use std::sync::Arc;

use mf_cache_memory::MemoryCacheStore;
use mf_core::models::{NewPost, Post, UserId};
use mf_core::settings::EngineSettings;
use mf_db_sqlite::SqlitePostRepo;
use mf_feed::FeedEngine;

pub struct Harness {
    pub repo: Arc<SqlitePostRepo>,
    pub cache: Arc<MemoryCacheStore>,
    pub engine: FeedEngine,
}

pub fn fast_settings() -> EngineSettings {
    let mut settings = EngineSettings::default();
    settings.invalidation.second_delete_ms = 30;
    settings
}

pub async fn harness() -> Harness {
    let repo = Arc::new(SqlitePostRepo::new("sqlite::memory:").await.unwrap());
    let cache = Arc::new(MemoryCacheStore::new());
    let engine = FeedEngine::bootstrap(repo.clone(), repo.clone(), cache.clone(), fast_settings()).await;
    Harness { repo, cache, engine }
}

impl Harness {
    /// Publishes and waits for fan-out to finish.
    pub async fn post(&self, author_id: UserId, content: &str) -> Post {
        let (post, fanout) = self
            .engine
            .publish(NewPost {
                author_id,
                content: content.to_string(),
                media_url: None,
            })
            .await
            .unwrap();
        fanout.await.unwrap();
        post
    }
}
