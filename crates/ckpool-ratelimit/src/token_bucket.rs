//! A single token bucket: atomic token count, lazy integer refill, CAS-based
//! consume. No lock is needed — the whole bucket lives in a couple of
//! atomics.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use ckpool_core::Clock;

#[derive(Debug)]
pub struct TokenBucket {
    tokens: AtomicU32,
    max_tokens: u32,
    refill_per_minute: u32,
    last_refill: AtomicU64,
}

impl TokenBucket {
    /// A fresh bucket starts full, so a first-seen IP/connection can make up
    /// to `max_tokens` admissions immediately.
    pub fn new(max_tokens: u32, refill_per_minute: u32, now: u64) -> Self {
        Self {
            tokens: AtomicU32::new(max_tokens),
            max_tokens,
            refill_per_minute,
            last_refill: AtomicU64::new(now),
        }
    }

    pub fn tokens(&self) -> u32 {
        self.tokens.load(Ordering::Relaxed)
    }

    /// Lazily refills based on elapsed time since the last refill, then
    /// attempts to consume one token via a CAS retry loop. Returns whether a
    /// token was taken.
    pub fn consume(&self, clock: &dyn Clock) -> bool {
        self.refill(clock.now());

        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            if current == 0 {
                return false;
            }
            if self
                .tokens
                .compare_exchange_weak(
                    current,
                    current - 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return true;
            }
            // Another thread drained or refilled the bucket between our
            // load and CAS; reread and retry while tokens remain.
        }
    }

    fn refill(&self, now: u64) {
        let last = self.last_refill.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last);
        let add = (elapsed as u128 * self.refill_per_minute as u128 / 60) as u32;
        if add == 0 {
            return;
        }

        loop {
            let current = self.tokens.load(Ordering::Relaxed);
            let next = current.saturating_add(add).min(self.max_tokens);
            if self
                .tokens
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        // Only advance last_refill once tokens were actually added, matching
        // the "advances only if any were added" invariant.
        self.last_refill.store(now, Ordering::Relaxed);
    }
}
