//! Per-worker reconnect-difficulty memory: `vardiff:<worker-name>` -> decimal
//! difficulty, persisted to Redis every 30 s with a 24 h TTL and loaded back
//! on startup so a worker that reconnects after a restart keeps its last
//! difficulty instead of renegotiating from scratch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ckpool_core::{Clock, RedisTarget};
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::refreshable::RefreshableCache;

pub const PERSIST_INTERVAL: Duration = Duration::from_secs(30);
pub const KEY_PREFIX: &str = "vardiff:";
pub const TTL_SECONDS: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarDiffEntry {
    pub difficulty: i64,
    pub last_seen: u64,
}

pub struct VarDiffCache {
    cache: Arc<RefreshableCache<VarDiffEntry>>,
    redis_target: Option<RedisTarget>,
    clock: Arc<dyn Clock>,
}

impl VarDiffCache {
    pub fn new(redis_target: Option<RedisTarget>, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            cache: RefreshableCache::new(),
            redis_target,
            clock,
        })
    }

    /// Last-known difficulty for a worker, if present and not expired.
    pub fn get(&self, worker_name: &str) -> Option<i64> {
        let entry = self.cache.get(worker_name)?;
        let age = self.clock.now().saturating_sub(entry.last_seen);
        if age > TTL_SECONDS {
            return None;
        }
        Some(entry.difficulty)
    }

    /// Records a worker's current difficulty in memory immediately; the
    /// next persist cycle pushes it to Redis.
    pub fn save_reconnect_diff(&self, worker_name: &str, difficulty: i64) {
        self.cache.insert(
            worker_name.to_string(),
            VarDiffEntry {
                difficulty,
                last_seen: self.clock.now(),
            },
        );
    }

    fn evict_expired(&self) {
        let now = self.clock.now();
        let fresh: HashMap<String, VarDiffEntry> = self
            .cache
            .snapshot()
            .into_iter()
            .filter(|(_, v)| now.saturating_sub(v.last_seen) <= TTL_SECONDS)
            .collect();
        self.cache.swap(fresh);
    }

    async fn persist_cycle(&self) -> crate::error::Result<()> {
        let Some(target) = &self.redis_target else {
            self.evict_expired();
            return Ok(());
        };
        let client = redis::Client::open(target.to_connection_url())
            .map_err(crate::error::RedisCacheError::Open)?;
        let mut conn = client
            .get_async_connection()
            .await
            .map_err(crate::error::RedisCacheError::Connect)?;

        let now = self.clock.now();
        let entries = self.cache.snapshot();
        for (worker_name, entry) in &entries {
            if now.saturating_sub(entry.last_seen) > TTL_SECONDS {
                continue;
            }
            let key = format!("{KEY_PREFIX}{worker_name}");
            let value = entry.difficulty.to_string();
            let _: () = conn
                .set_ex(&key, value, TTL_SECONDS)
                .await
                .map_err(crate::error::RedisCacheError::Command)?;
        }

        let pattern = format!("{KEY_PREFIX}*");
        let mut iter: redis::AsyncIter<String> = conn
            .scan_match(&pattern)
            .await
            .map_err(crate::error::RedisCacheError::Command)?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        drop(iter);

        let mut loaded = entries;
        for key in keys {
            let Some(worker_name) = key.strip_prefix(KEY_PREFIX) else {
                continue;
            };
            let raw: Option<String> = conn
                .get(&key)
                .await
                .map_err(crate::error::RedisCacheError::Command)?;
            let Some(raw) = raw else { continue };
            let Ok(difficulty) = raw.parse::<i64>() else {
                warn!(redis_key = %key, "ignoring non-numeric vardiff value");
                continue;
            };
            loaded
                .entry(worker_name.to_string())
                .or_insert(VarDiffEntry {
                    difficulty,
                    last_seen: now,
                });
        }

        let fresh: HashMap<String, VarDiffEntry> = loaded
            .into_iter()
            .filter(|(_, v)| now.saturating_sub(v.last_seen) <= TTL_SECONDS)
            .collect();
        self.cache.swap(fresh);
        Ok(())
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn run_persister(self: Arc<Self>, cancel: CancellationToken) {
        info!("vardiff reconnect cache persister starting");
        if let Err(e) = self.persist_cycle().await {
            warn!(error = %e, "initial vardiff persist/load cycle failed");
        }
        loop {
            tokio::select! {
                _ = tokio::time::sleep(PERSIST_INTERVAL) => {
                    if let Err(e) = self.persist_cycle().await {
                        warn!(error = %e, "vardiff persist cycle failed, keeping stale map");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
        info!("vardiff reconnect cache persister stopped");
    }
}
