//! # minifeed Binary
//!
//! Assembles the engine from the plugins selected at compile time.

mod logging;

use std::sync::Arc;

use mf_cache_memory::MemoryCacheStore;
use mf_config::Settings;
use mf_core::traits::CacheStore;
use mf_feed::FeedEngine;
use secrecy::ExposeSecret;
use tokio::sync::watch;

#[cfg(feature = "db-sqlite")]
use mf_db_sqlite::SqlitePostRepo;

#[cfg(feature = "cache-redis")]
use mf_cache_redis::RedisCacheStore;

#[cfg(not(feature = "db-sqlite"))]
compile_error!("minifeed needs a durable store; enable the `db-sqlite` feature");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    logging::init(&settings.log);

    // 1. Durable store
    let repo = Arc::new(SqlitePostRepo::new(settings.database_url.expose_secret()).await?);

    // 2. Ephemeral store
    let cache = open_cache(&settings).await?;

    // 3. Engine: seeds the membership filter
    let engine = FeedEngine::bootstrap(repo.clone(), repo, cache, settings.engine.clone()).await;

    // 4. Background jobs
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let jobs = engine.spawn_background_jobs(shutdown_rx);

    tracing::info!("minifeed engine running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    shutdown_tx.send_replace(true);
    for job in jobs {
        if let Err(err) = job.await {
            tracing::warn!(error = %err, "background job ended abnormally");
        }
    }
    Ok(())
}

async fn open_cache(settings: &Settings) -> anyhow::Result<Arc<dyn CacheStore>> {
    match &settings.redis_url {
        #[cfg(feature = "cache-redis")]
        Some(url) => {
            let store = RedisCacheStore::connect(url.expose_secret()).await?;
            tracing::info!("using redis cache store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "cache-redis"))]
        Some(_) => {
            tracing::warn!("redis_url is set but the cache-redis feature is off; using in-process cache");
            Ok(Arc::new(MemoryCacheStore::new()))
        }
        None => {
            tracing::info!("using in-process cache store");
            Ok(Arc::new(MemoryCacheStore::new()))
        }
    }
}
