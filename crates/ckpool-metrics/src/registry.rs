//! Atomic Prometheus-style counters and gauges. No lock is ever taken: a
//! reader (the HTTP exposer) only issues atomic loads, and a writer (the
//! share-validation hot path) only issues atomic stores/fetch-adds.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

macro_rules! counter {
    ($name:ident) => {
        pub fn $name(&self) {
            self.$name.fetch_add(1, Ordering::Relaxed);
        }
    };
}

#[derive(Debug)]
pub struct Metrics {
    shares_valid: AtomicU64,
    shares_invalid: AtomicU64,
    shares_stale: AtomicU64,
    blocks_found: AtomicU64,
    connected_miners: AtomicI64,
    bitcoin_height: AtomicU64,
    bitcoin_connected: AtomicI64,
    asicboost_miners: AtomicI64,
    total_diff_accepted: AtomicU64,
    start_time: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            shares_valid: AtomicU64::new(0),
            shares_invalid: AtomicU64::new(0),
            shares_stale: AtomicU64::new(0),
            blocks_found: AtomicU64::new(0),
            connected_miners: AtomicI64::new(0),
            bitcoin_height: AtomicU64::new(0),
            bitcoin_connected: AtomicI64::new(0),
            asicboost_miners: AtomicI64::new(0),
            total_diff_accepted: AtomicU64::new(0),
            start_time: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(inc_shares_valid);
    counter!(inc_shares_invalid);
    counter!(inc_shares_stale);
    counter!(inc_blocks_found);

    pub fn add_diff_accepted(&self, diff: u64) {
        self.total_diff_accepted.fetch_add(diff, Ordering::Relaxed);
    }

    pub fn set_connected_miners(&self, n: i64) {
        self.connected_miners.store(n, Ordering::Relaxed);
    }

    pub fn set_bitcoin_height(&self, height: u64) {
        self.bitcoin_height.store(height, Ordering::Relaxed);
    }

    pub fn set_bitcoin_connected(&self, connected: bool) {
        self.bitcoin_connected
            .store(connected as i64, Ordering::Relaxed);
    }

    pub fn set_asicboost_miners(&self, n: i64) {
        self.asicboost_miners.store(n, Ordering::Relaxed);
    }

    fn uptime_seconds(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(self.start_time);
        now.saturating_sub(self.start_time)
    }

    /// Renders the full Prometheus text-exposition body: HELP/TYPE/sample
    /// triples for each of the ten stable external metric names.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);
        line_counter(
            &mut out,
            "ckpool_shares_valid_total",
            "Total number of valid shares accepted",
            self.shares_valid.load(Ordering::Relaxed),
        );
        line_counter(
            &mut out,
            "ckpool_shares_invalid_total",
            "Total number of invalid shares rejected",
            self.shares_invalid.load(Ordering::Relaxed),
        );
        line_counter(
            &mut out,
            "ckpool_shares_stale_total",
            "Total number of stale shares rejected",
            self.shares_stale.load(Ordering::Relaxed),
        );
        line_counter(
            &mut out,
            "ckpool_blocks_found_total",
            "Total number of blocks found by this pool",
            self.blocks_found.load(Ordering::Relaxed),
        );
        line_gauge(
            &mut out,
            "ckpool_connected_miners",
            "Current number of connected miner connections",
            self.connected_miners.load(Ordering::Relaxed),
        );
        line_gauge(
            &mut out,
            "ckpool_bitcoin_height",
            "Current known Bitcoin block height",
            self.bitcoin_height.load(Ordering::Relaxed) as i64,
        );
        line_gauge(
            &mut out,
            "ckpool_bitcoin_connected",
            "Whether the backing Bitcoin node connection is up (1) or down (0)",
            self.bitcoin_connected.load(Ordering::Relaxed),
        );
        line_gauge(
            &mut out,
            "ckpool_asicboost_miners_total",
            "Current number of connected miners advertising AsicBoost",
            self.asicboost_miners.load(Ordering::Relaxed),
        );
        line_counter(
            &mut out,
            "ckpool_total_diff_accepted_total",
            "Sum of share difficulty accepted",
            self.total_diff_accepted.load(Ordering::Relaxed),
        );
        line_gauge(
            &mut out,
            "ckpool_uptime_seconds",
            "Seconds since process start",
            self.uptime_seconds() as i64,
        );
        out
    }
}

fn line_counter(out: &mut String, name: &str, help: &str, value: u64) {
    out.push_str(&format!(
        "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
    ));
}

fn line_gauge(out: &mut String, name: &str, help: &str, value: i64) {
    out.push_str(&format!(
        "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n"
    ));
}
