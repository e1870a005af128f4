//! Fixed-size relay peer table: up to 16 concurrently registered relays,
//! each backed by its own per-peer reader task. A mutex-guarded `Vec` of
//! optional slots stands in for the original's fixed C array; the cap is
//! enforced the same way (reserve the first `None` slot, refuse past 16).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex as AsyncMutex;

pub const MAX_PEERS: usize = 16;
pub const MAX_REGION_LEN: usize = 31;

pub struct PeerSlot {
    pub writer: AsyncMutex<OwnedWriteHalf>,
    pub region: Mutex<String>,
    pub last_heartbeat: AtomicU64,
    pub active: std::sync::atomic::AtomicBool,
}

impl PeerSlot {
    fn new(writer: OwnedWriteHalf, now: u64) -> Arc<Self> {
        Arc::new(Self {
            writer: AsyncMutex::new(writer),
            region: Mutex::new(String::new()),
            last_heartbeat: AtomicU64::new(now),
            active: std::sync::atomic::AtomicBool::new(true),
        })
    }

    pub fn set_region(&self, raw: &[u8]) {
        let truncated = String::from_utf8_lossy(&raw[..raw.len().min(MAX_REGION_LEN)]).to_string();
        *self.region.lock() = truncated;
    }

    pub fn touch_heartbeat(&self, now: u64) {
        self.last_heartbeat.store(now, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Relaxed);
    }
}

/// A fixed-capacity table of peer slots. Slots are never removed, only
/// marked inactive and reused, keeping template-push latency predictable
/// regardless of churn.
pub struct PeerTable {
    slots: Mutex<Vec<Option<Arc<PeerSlot>>>>,
}

impl Default for PeerTable {
    fn default() -> Self {
        Self {
            slots: Mutex::new((0..MAX_PEERS).map(|_| None).collect()),
        }
    }
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the first inactive (or empty) slot for a newly accepted
    /// peer connection. Returns `None` if the table is full.
    pub fn reserve(&self, writer: OwnedWriteHalf, now: u64) -> Option<(usize, Arc<PeerSlot>)> {
        let mut slots = self.slots.lock();
        for (idx, slot) in slots.iter_mut().enumerate() {
            let is_free = match slot {
                None => true,
                Some(existing) => !existing.is_active(),
            };
            if is_free {
                let peer = PeerSlot::new(writer, now);
                *slot = Some(peer.clone());
                return Some((idx, peer));
            }
        }
        None
    }

    pub fn active_peers(&self) -> Vec<Arc<PeerSlot>> {
        self.slots
            .lock()
            .iter()
            .filter_map(|s| s.clone())
            .filter(|p| p.is_active())
            .collect()
    }

    pub fn len_active(&self) -> usize {
        self.active_peers().len()
    }
}
