//! Per-IP admission control: a token-bucket connect limit, a soft-ban
//! mechanism, and a global connection cap, backed by a read-write-locked map
//! so lookups are cheap and the occasional insert/reap takes a short write
//! section.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ckpool_core::Clock;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::entry::IpEntry;

pub const RATE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
pub const RATE_STALE_THRESHOLD: u64 = 300;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub connections_per_ip_per_minute: u32,
    pub max_connections_per_ip: u32,
    pub global_max_connections: u32,
    pub softban_duration_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            connections_per_ip_per_minute: 10,
            max_connections_per_ip: 20,
            global_max_connections: 10_000,
            softban_duration_seconds: 300,
        }
    }
}

pub struct RateLimiter {
    config: RateLimiterConfig,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<IpAddr, Arc<IpEntry>>>,
    global_active: AtomicU32,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            config,
            clock,
            entries: RwLock::new(HashMap::new()),
            global_active: AtomicU32::new(0),
        })
    }

    pub fn global_active(&self) -> u32 {
        self.global_active.load(Ordering::Relaxed)
    }

    /// Admission check for a new connection from `ip`. Matches the
    /// specification's admission order exactly: global cap, then soft-ban,
    /// then per-IP cap, then the connect token bucket.
    #[tracing::instrument(skip(self))]
    pub fn connect(&self, ip: IpAddr) -> bool {
        if self.global_active.load(Ordering::Relaxed) >= self.config.global_max_connections {
            return false;
        }

        let now = self.clock.now();
        let entry = self.entry_for(ip, now);
        entry.touch(now);

        if entry.is_softbanned(now) {
            return false;
        }
        entry.clear_expired_softban(now);

        if entry.active_connections() >= self.config.max_connections_per_ip {
            return false;
        }

        if !entry.connect_bucket.consume(self.clock.as_ref()) {
            return false;
        }

        entry.incr_active();
        self.global_active.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn disconnect(&self, ip: IpAddr) {
        if let Some(entry) = self.entries.read().get(&ip).cloned() {
            entry.decr_active();
        }
        let _ = self
            .global_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn softban(&self, ip: IpAddr) {
        let now = self.clock.now();
        let entry = self.entry_for(ip, now);
        entry.softban(now, self.config.softban_duration_seconds);
    }

    fn entry_for(&self, ip: IpAddr, now: u64) -> Arc<IpEntry> {
        if let Some(entry) = self.entries.read().get(&ip) {
            return entry.clone();
        }
        let mut write = self.entries.write();
        write
            .entry(ip)
            .or_insert_with(|| {
                Arc::new(IpEntry::new(
                    self.config.connections_per_ip_per_minute,
                    now,
                ))
            })
            .clone()
    }

    /// Deletes entries with no active connections whose `last_seen` is older
    /// than [`RATE_STALE_THRESHOLD`]. Runs under the map's write lock so it
    /// never races a concurrent `connect`/`disconnect` touching the same
    /// entry's liveness.
    fn reap(&self) {
        let now = self.clock.now();
        let mut write = self.entries.write();
        write.retain(|_, entry| {
            entry.active_connections() > 0
                || (now as i64 - entry.last_seen()) < RATE_STALE_THRESHOLD as i64
        });
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }
}

/// Background reaper loop: wakes every [`RATE_CLEANUP_INTERVAL`] and reaps
/// stale, inactive entries, until `cancel` fires.
#[tracing::instrument(skip(limiter, cancel))]
pub async fn run_reaper(limiter: Arc<RateLimiter>, cancel: CancellationToken) {
    info!("rate limiter reaper starting");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(RATE_CLEANUP_INTERVAL) => {
                limiter.reap();
            }
            _ = cancel.cancelled() => break,
        }
    }
    info!("rate limiter reaper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ckpool_core::TestClock;
    use std::net::Ipv4Addr;

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn per_ip_cap_denies_eleventh_connect() {
        let clock = Arc::new(TestClock::default());
        let config = RateLimiterConfig {
            connections_per_ip_per_minute: 10,
            max_connections_per_ip: 20,
            global_max_connections: 10_000,
            softban_duration_seconds: 300,
        };
        let limiter = RateLimiter::new(config, clock);
        let the_ip = ip(1);
        for _ in 0..10 {
            assert!(limiter.connect(the_ip));
        }
        assert!(!limiter.connect(the_ip));

        limiter.disconnect(the_ip);
        // Disconnecting frees an active-connection slot but the token
        // bucket itself stays drained until it refills.
        assert_eq!(limiter.entries.read().get(&the_ip).unwrap().active_connections(), 9);
    }

    #[test]
    fn global_cap_scenario_from_spec() {
        let clock = Arc::new(TestClock::default());
        let config = RateLimiterConfig {
            connections_per_ip_per_minute: 100,
            max_connections_per_ip: 100,
            global_max_connections: 5,
            softban_duration_seconds: 300,
        };
        let limiter = RateLimiter::new(config, clock);

        for n in 1..=5 {
            assert!(limiter.connect(ip(n)), "ip {n} should connect");
        }
        for n in 6..=10 {
            assert!(!limiter.connect(ip(n)), "ip {n} should be denied");
        }

        limiter.disconnect(ip(1));
        assert!(limiter.connect(ip(11)));
    }

    #[test]
    fn softban_denies_until_expiry() {
        let clock = Arc::new(TestClock::default());
        let limiter = RateLimiter::new(RateLimiterConfig::default(), clock.clone());
        let the_ip = ip(1);
        assert!(limiter.connect(the_ip));
        limiter.disconnect(the_ip);

        limiter.softban(the_ip);
        assert!(!limiter.connect(the_ip));

        clock.advance(RateLimiterConfig::default().softban_duration_seconds + 1);
        assert!(limiter.connect(the_ip));
    }

    #[test]
    fn reaper_never_removes_active_entries() {
        let clock = Arc::new(TestClock::default());
        let limiter = RateLimiter::new(RateLimiterConfig::default(), clock.clone());
        let the_ip = ip(1);
        assert!(limiter.connect(the_ip));

        clock.advance(RATE_STALE_THRESHOLD + 1000);
        limiter.reap();

        assert_eq!(limiter.entry_count(), 1);
    }

    #[test]
    fn reaper_removes_stale_inactive_entries() {
        let clock = Arc::new(TestClock::default());
        let limiter = RateLimiter::new(RateLimiterConfig::default(), clock.clone());
        let the_ip = ip(1);
        assert!(limiter.connect(the_ip));
        limiter.disconnect(the_ip);

        clock.advance(RATE_STALE_THRESHOLD + 1);
        limiter.reap();

        assert_eq!(limiter.entry_count(), 0);
    }
}
