//! # mf-cache-memory
//!
//! Process-local implementation of `CacheStore`.
//! Mirrors the Redis semantics the engine relies on (typed keys, TTLs,
//! atomic batches) so a single node can run without an external cache.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use mf_core::traits::{CacheBatch, CacheOp, CacheStore};
use tokio::time::Instant;

#[derive(Debug)]
enum Value {
    Str(String),
    Set(HashSet<String>),
    SortedSet(HashMap<String, f64>),
    List(Vec<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self { value, expires_at: None }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    /// Drops the entry if its TTL has passed, then returns it.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn set_of(&mut self, key: &str, create: bool) -> anyhow::Result<Option<&mut HashSet<String>>> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries.insert(key.to_string(), Entry::new(Value::Set(HashSet::new())));
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::Set(set)) => Ok(Some(set)),
            _ => bail!("WRONGTYPE key {key} does not hold a set"),
        }
    }

    fn sorted_set_of(&mut self, key: &str, create: bool) -> anyhow::Result<Option<&mut HashMap<String, f64>>> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries.insert(key.to_string(), Entry::new(Value::SortedSet(HashMap::new())));
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::SortedSet(zset)) => Ok(Some(zset)),
            _ => bail!("WRONGTYPE key {key} does not hold a sorted set"),
        }
    }

    fn list_of(&mut self, key: &str, create: bool) -> anyhow::Result<Option<&mut Vec<String>>> {
        if self.live(key).is_none() {
            if !create {
                return Ok(None);
            }
            self.entries.insert(key.to_string(), Entry::new(Value::List(Vec::new())));
        }
        match self.entries.get_mut(key).map(|e| &mut e.value) {
            Some(Value::List(list)) => Ok(Some(list)),
            _ => bail!("WRONGTYPE key {key} does not hold a list"),
        }
    }

    /// Empty collections disappear, as they do in Redis.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.entries.get(key).map(|e| &e.value) {
            Some(Value::Set(s)) => s.is_empty(),
            Some(Value::SortedSet(z)) => z.is_empty(),
            Some(Value::List(l)) => l.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
        }
    }

    fn put_string(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
    }

    fn push(&mut self, key: &str, values: &[String]) -> anyhow::Result<()> {
        if let Some(list) = self.list_of(key, true)? {
            list.extend(values.iter().cloned());
        }
        self.drop_if_empty(key);
        Ok(())
    }

    fn expire(&mut self, key: &str, ttl: Duration) {
        if let Some(entry) = self.live(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
    }

    /// Replays the key types a batch would produce, touching only the keys
    /// it names, and fails if any push would hit a non-list.
    fn check_batch(&mut self, ops: &[CacheOp]) -> anyhow::Result<()> {
        // key -> "holds a non-list value" after the ops seen so far
        let mut pending: HashMap<&str, bool> = HashMap::new();
        for op in ops {
            match op {
                CacheOp::Delete(key) => {
                    pending.insert(key.as_str(), false);
                }
                CacheOp::Set { key, .. } => {
                    pending.insert(key.as_str(), true);
                }
                CacheOp::ListPush { key, .. } => {
                    let blocked = match pending.get(key.as_str()) {
                        Some(blocked) => *blocked,
                        None => self.live(key).is_some_and(|e| !matches!(e.value, Value::List(_))),
                    };
                    if blocked {
                        bail!("WRONGTYPE key {key} does not hold a list");
                    }
                    pending.insert(key.as_str(), false);
                }
                CacheOp::Expire { .. } => {}
            }
        }
        Ok(())
    }
}

/// In-memory `CacheStore`. Cheap to clone the handle via `Arc`.
#[derive(Default)]
pub struct MemoryCacheStore {
    inner: Mutex<Keyspace>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Keyspace> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live keys; handy for assertions.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().entries.values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn set_contains(&self, key: &str, member: &str) -> anyhow::Result<bool> {
        let mut ks = self.lock();
        Ok(ks.set_of(key, false)?.is_some_and(|set| set.contains(member)))
    }

    async fn set_add(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut ks = self.lock();
        if let Some(set) = ks.set_of(key, true)? {
            set.insert(member.to_string());
        }
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> anyhow::Result<()> {
        let mut ks = self.lock();
        if let Some(set) = ks.set_of(key, false)? {
            set.remove(member);
        }
        ks.drop_if_empty(key);
        Ok(())
    }

    async fn set_len(&self, key: &str) -> anyhow::Result<u64> {
        let mut ks = self.lock();
        Ok(ks.set_of(key, false)?.map_or(0, |set| set.len() as u64))
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut ks = self.lock();
        match ks.live(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(_) => bail!("WRONGTYPE key {key} does not hold a string"),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> anyhow::Result<()> {
        self.lock().put_string(key, value, ttl);
        Ok(())
    }

    async fn sorted_add(&self, key: &str, member: &str, score: f64) -> anyhow::Result<()> {
        let mut ks = self.lock();
        if let Some(zset) = ks.sorted_set_of(key, true)? {
            zset.insert(member.to_string(), score);
        }
        Ok(())
    }

    async fn sorted_rev_range_by_score(
        &self,
        key: &str,
        max_exclusive: Option<f64>,
        min: f64,
        count: usize,
    ) -> anyhow::Result<Vec<(String, f64)>> {
        let mut ks = self.lock();
        let Some(zset) = ks.sorted_set_of(key, false)? else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<(String, f64)> = zset
            .iter()
            .filter(|(_, score)| **score >= min && max_exclusive.map_or(true, |max| **score < max))
            .map(|(member, &score)| (member.clone(), score))
            .collect();
        // Ties resolve by member descending, matching ZREVRANGEBYSCORE.
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        hits.truncate(count);
        Ok(hits)
    }

    async fn list_push(&self, key: &str, values: &[String]) -> anyhow::Result<()> {
        self.lock().push(key, values)
    }

    async fn list_range(&self, key: &str, start: usize, stop: usize) -> anyhow::Result<Vec<String>> {
        let mut ks = self.lock();
        let Some(list) = ks.list_of(key, false)? else {
            return Ok(Vec::new());
        };
        if start >= list.len() || start > stop {
            return Ok(Vec::new());
        }
        let end = stop.min(list.len() - 1);
        Ok(list[start..=end].to_vec())
    }

    async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.lock().live(key).is_some())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.lock().entries.remove(key);
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let now = Instant::now();
        let ks = self.lock();
        let mut keys: Vec<String> = ks
            .entries
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && e.is_live(now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn execute(&self, batch: CacheBatch) -> anyhow::Result<()> {
        let mut ks = self.lock();
        // Only a push onto a non-list can fail; reject those before any op lands.
        ks.check_batch(batch.ops())?;
        for op in batch.into_ops() {
            match op {
                CacheOp::Delete(key) => {
                    ks.entries.remove(&key);
                }
                CacheOp::Set { key, value, ttl } => ks.put_string(&key, &value, ttl),
                CacheOp::ListPush { key, values } => ks.push(&key, &values)?,
                CacheOp::Expire { key, ttl } => ks.expire(&key, ttl),
            }
        }
        Ok(())
    }
}
