//! Per-IP rate-limiter state and the four per-connection token buckets.

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use ckpool_core::Clock;

use crate::token_bucket::TokenBucket;

/// State tracked for a single source IP across its lifetime in the limiter.
pub struct IpEntry {
    pub connect_bucket: TokenBucket,
    active_connections: AtomicU32,
    first_seen: AtomicI64,
    last_seen: AtomicI64,
    softban_until: AtomicI64,
}

impl IpEntry {
    pub fn new(connections_per_minute: u32, now: u64) -> Self {
        Self {
            connect_bucket: TokenBucket::new(connections_per_minute, connections_per_minute, now),
            active_connections: AtomicU32::new(0),
            first_seen: AtomicI64::new(now as i64),
            last_seen: AtomicI64::new(now as i64),
            softban_until: AtomicI64::new(0),
        }
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn touch(&self, now: u64) {
        self.last_seen.store(now as i64, Ordering::Relaxed);
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen.load(Ordering::Relaxed)
    }

    pub fn first_seen(&self) -> i64 {
        self.first_seen.load(Ordering::Relaxed)
    }

    pub fn is_softbanned(&self, now: u64) -> bool {
        self.softban_until.load(Ordering::Relaxed) > now as i64
    }

    pub fn softban(&self, now: u64, duration_secs: u64) {
        self.softban_until
            .store((now + duration_secs) as i64, Ordering::Relaxed);
    }

    pub fn clear_expired_softban(&self, now: u64) {
        let until = self.softban_until.load(Ordering::Relaxed);
        if until != 0 && until <= now as i64 {
            self.softban_until.store(0, Ordering::Relaxed);
        }
    }

    pub fn incr_active(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Clamped at zero: a stray extra disconnect can never underflow the
    /// per-IP live-connection counter.
    pub fn decr_active(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }
}

/// The four token buckets tracked per live connection, one per admission
/// category.
pub struct ConnectionState {
    pub subscribe: TokenBucket,
    pub authorize: TokenBucket,
    pub submit: TokenBucket,
    pub invalid_share: TokenBucket,
}

impl ConnectionState {
    pub fn new(
        max_subscribes: u32,
        max_authorizes: u32,
        max_submits: u32,
        max_invalid: u32,
        clock: &dyn Clock,
    ) -> Self {
        let now = clock.now();
        Self {
            subscribe: TokenBucket::new(max_subscribes, max_subscribes, now),
            authorize: TokenBucket::new(max_authorizes, max_authorizes, now),
            submit: TokenBucket::new(max_submits, max_submits, now),
            invalid_share: TokenBucket::new(max_invalid, max_invalid, now),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Subscribe,
    Authorize,
    Submit,
    InvalidShare,
}

impl ConnectionState {
    pub fn check(&self, kind: MessageKind, clock: &dyn Clock) -> bool {
        match kind {
            MessageKind::Subscribe => self.subscribe.consume(clock),
            MessageKind::Authorize => self.authorize.consume(clock),
            MessageKind::Submit => self.submit.consume(clock),
            MessageKind::InvalidShare => self.invalid_share.consume(clock),
        }
    }
}
