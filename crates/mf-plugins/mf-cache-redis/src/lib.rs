//! # mf-cache-redis
//!
//! Redis implementation of `CacheStore` over a deadpool connection pool.
//! Every call checks a connection out of the pool, so concurrent requests
//! never queue behind one another on a shared connection.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use deadpool_redis::redis::{self, Pipeline};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use mf_core::traits::{CacheBatch, CacheOp, CacheStore};

/// Keys fetched per SCAN round trip.
const SCAN_COUNT: usize = 100;

pub struct RedisCacheStore {
    pool: Pool,
}

impl RedisCacheStore {
    /// Builds the pool and verifies the server answers a PING.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .context("failed to build redis pool")?;
        let store = Self { pool };

        let mut conn = store.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await.context("redis ping failed")?;
        tracing::info!("redis cache store connected");
        Ok(store)
    }

    async fn conn(&self) -> anyhow::Result<Connection> {
        self.pool.get().await.context("failed to check out redis connection")
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX/PEXPIRE reject 0
    (ttl.as_millis() as u64).max(1)
}

fn push_op(pipe: &mut Pipeline, op: CacheOp) {
    match op {
        CacheOp::Delete(key) => {
            pipe.cmd("DEL").arg(key).ignore();
        }
        CacheOp::Set { key, value, ttl: None } => {
            pipe.cmd("SET").arg(key).arg(value).ignore();
        }
        CacheOp::Set {
            key,
            value,
            ttl: Some(ttl),
        } => {
            pipe.cmd("SET").arg(key).arg(value).arg("PX").arg(ttl_millis(ttl)).ignore();
        }
        CacheOp::ListPush { values, .. } if values.is_empty() => {}
        CacheOp::ListPush { key, values } => {
            pipe.cmd("RPUSH").arg(key).arg(values).ignore();
        }
        CacheOp::Expire { key, ttl } => {
            pipe.cmd("PEXPIRE").arg(key).arg(ttl_millis(ttl)).ignore();
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn set_contains(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn().await?;
        Ok(redis::cmd("SISMEMBER").arg(key).arg(member).query_async(&mut conn).await?)
    }

    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("SADD").arg(key).arg(member).query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("SREM").arg(key).arg(member).query_async(&mut conn).await?;
        Ok(())
    }

    async fn set_len(&self, key: &str) -> anyhow::Result<u64> {
        let mut conn = self.conn().await?;
        Ok(redis::cmd("SCARD").arg(key).query_async(&mut conn).await?)
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn().await?;
        Ok(redis::cmd("GET").arg(key).query_async(&mut conn).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("ZADD").arg(key).arg(score).arg(member).query_async(&mut conn).await?;
        Ok(())
    }

    async fn sorted_rev_range_by_score(
        &self,
        key: &str,
        max_exclusive: Option<f64>,
        min: f64,
        count: usize,
    ) -> anyhow::Result<Vec<(String, f64)>> {
        let max = match max_exclusive {
            Some(max) => format!("({max}"),
            None => "+inf".to_string(),
        };
        let mut conn = self.conn().await?;
        Ok(redis::cmd("ZREVRANGEBYSCORE")
            .arg(key)
            .arg(max)
            .arg(min)
            .arg("WITHSCORES")
            .arg("LIMIT")
            .arg(0)
            .arg(count)
            .query_async(&mut conn)
            .await?)
    }

    async fn list_push(&self, key: &str, values: &[String]) -> anyhow::Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("RPUSH").arg(key).arg(values).query_async(&mut conn).await?;
        Ok(())
    }

    async fn list_range(&self, key: &str, start: usize, stop: usize) -> anyhow::Result<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(redis::cmd("LRANGE").arg(key).arg(start).arg(stop).query_async(&mut conn).await?)
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn().await?;
        let n: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(n > 0)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn().await?;
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let pattern = format!("{prefix}*");
        let mut conn = self.conn().await?;
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn execute(&self, batch: CacheBatch) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in batch.into_ops() {
            push_op(&mut pipe, op);
        }
        let mut conn = self.conn().await?;
        let _: () = pipe.query_async(&mut conn).await.context("redis MULTI/EXEC batch failed")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(90)), 90_000);
    }

    #[test]
    fn empty_list_push_is_dropped_from_pipeline() {
        let mut with_push = redis::pipe();
        push_op(
            &mut with_push,
            CacheOp::ListPush {
                key: "hot:posts".into(),
                values: vec![],
            },
        );
        assert!(with_push.cmd_iter().next().is_none());

        let mut with_delete = redis::pipe();
        push_op(&mut with_delete, CacheOp::Delete("hot:posts".into()));
        assert_eq!(with_delete.cmd_iter().count(), 1);
    }

    /// Needs a live server: `REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_batch_against_live_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let store = RedisCacheStore::connect(&url).await.expect("redis not reachable");

        let batch = CacheBatch::new()
            .delete("mf-test:hot")
            .list_push("mf-test:hot", vec!["2".into(), "1".into()])
            .expire("mf-test:hot", Duration::from_secs(5));
        store.execute(batch).await.unwrap();

        assert_eq!(store.list_range("mf-test:hot", 0, 9).await.unwrap(), vec!["2", "1"]);
        store.delete("mf-test:hot").await.unwrap();
    }
}
