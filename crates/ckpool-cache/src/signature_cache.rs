//! Per-user coinbase signature cache: `user_coinbase:<bitcoin-address>` ->
//! signature string, refreshed from Redis every 60 s. Hot-path callers only
//! ever read the in-memory map; Redis is touched solely by the refresher.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ckpool_core::RedisTarget;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::refreshable::RefreshableCache;

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const KEY_PREFIX: &str = "user_coinbase:";
const MAX_SIGNATURE_LEN: usize = 20;

/// Allowed signature character set per the domain rules: letters, digits,
/// and a small set of punctuation. No control characters, no non-ASCII.
pub fn validate_signature(value: &str) -> bool {
    if value.is_empty() || value.len() > MAX_SIGNATURE_LEN {
        return false;
    }
    value.bytes().all(|b| {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':' | b'!' | b'#' | b'/' | b' ')
    })
}

pub struct SignatureCache {
    cache: Arc<RefreshableCache<String>>,
    redis_target: Option<RedisTarget>,
}

impl SignatureCache {
    pub fn new(redis_target: Option<RedisTarget>) -> Arc<Self> {
        Arc::new(Self {
            cache: RefreshableCache::new(),
            redis_target,
        })
    }

    /// Bitcoin address -> coinbase signature, if cached.
    pub fn get(&self, bitcoin_address: &str) -> Option<String> {
        self.cache.get(bitcoin_address)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    async fn refresh_once(&self) -> crate::error::Result<()> {
        let Some(target) = &self.redis_target else {
            return Ok(());
        };
        let client = redis::Client::open(target.to_connection_url())
            .map_err(crate::error::RedisCacheError::Open)?;
        let mut conn = client
            .get_async_connection()
            .await
            .map_err(crate::error::RedisCacheError::Connect)?;

        let mut fresh: HashMap<String, String> = HashMap::new();
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

        for key in keys {
            let value: Option<String> = conn
                .get(&key)
                .await
                .map_err(crate::error::RedisCacheError::Command)?;
            let Some(value) = value else { continue };
            if !validate_signature(&value) {
                warn!(redis_key = %key, "dropping signature cache entry failing validation");
                continue;
            }
            if let Some(address) = key.strip_prefix(KEY_PREFIX) {
                fresh.insert(address.to_string(), value);
            }
        }

        self.cache.swap(fresh);
        Ok(())
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn run_refresher(self: Arc<Self>, cancel: CancellationToken) {
        info!("signature cache refresher starting");
        loop {
            if let Err(e) = self.refresh_once().await {
                warn!(error = %e, "signature cache refresh cycle failed, keeping stale map");
            }
            tokio::select! {
                _ = tokio::time::sleep(REFRESH_INTERVAL) => {}
                _ = cancel.cancelled() => break,
            }
        }
        info!("signature cache refresher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_words_and_digit_strings() {
        assert!(validate_signature("hello"));
        assert!(validate_signature("Go Bitcoin!"));
        assert!(validate_signature(&"1".repeat(20)));
    }

    #[test]
    fn rejects_empty_oversize_and_control_characters() {
        assert!(!validate_signature(""));
        assert!(!validate_signature(&"a".repeat(21)));
        assert!(!validate_signature("line\nbreak"));
        assert!(!validate_signature("tab\there"));
        assert!(!validate_signature("at@sign"));
        assert!(!validate_signature("café"));
    }

    #[test]
    fn cache_with_no_redis_target_stays_empty_and_readable() {
        let cache = SignatureCache::new(None);
        assert!(cache.is_empty());
        assert_eq!(cache.get("bc1qanything"), None);
    }
}
