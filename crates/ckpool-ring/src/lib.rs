//! Lock-free SPMC-ish event ring: hot validation paths push serialized
//! records without allocating or blocking; a single drainer task empties
//! the ring onto a Unix datagram socket.
//!
//! The slot state machine (EMPTY -> WRITING -> READY -> EMPTY) is the only
//! synchronization a producer needs: claiming a slot is a fetch-add on
//! `write_pos` followed by a single CAS on that slot's state. No mutex is
//! ever taken on the push path.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixDatagram;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 2^12 slots, matching the fixed-capacity ring this crate replaces.
pub const RING_SIZE: usize = 4096;
const RING_MASK: u64 = (RING_SIZE - 1) as u64;

/// Slots are capped at 4096 bytes; a push is truncated to `EVENT_MAX_SIZE - 1`
/// bytes so every stored length fits the buffer with room for an eventual
/// trailing nul if a consumer wants one (the ring does not add one itself).
pub const EVENT_MAX_SIZE: usize = 4096;

/// Drainer collects at most this many ready slots per batch.
pub const BATCH_MAX: usize = 64;

/// Idle sleep when no slot is ready.
const IDLE_SLEEP: Duration = Duration::from_micros(100);

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;

struct Slot {
    state: AtomicU8,
    len: UnsafeCell<usize>,
    buf: UnsafeCell<[u8; EVENT_MAX_SIZE]>,
}

// SAFETY: `len` and `buf` are only touched by the single thread that holds
// the slot in the WRITING state (the producer that won the CAS) or the
// single drainer reading a slot it observed as READY. The atomic `state`
// field is the synchronization: a WRITING->READY transition uses Release
// ordering so the drainer's Acquire load of READY happens-after the
// producer's writes to `len`/`buf`.
unsafe impl Sync for Slot {}

impl Slot {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            len: UnsafeCell::new(0),
            buf: UnsafeCell::new([0u8; EVENT_MAX_SIZE]),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RingStats {
    pub queued: u64,
    pub dropped: u64,
    pub events_sent: u64,
    pub batch_count: u64,
    pub write_pos: u64,
    pub read_pos: u64,
}

pub struct EventRing {
    slots: Box<[Slot]>,
    write_pos: AtomicU64,
    read_pos: AtomicU64,
    queued: AtomicU64,
    dropped: AtomicU64,
    events_sent: AtomicU64,
    batch_count: AtomicU64,
}

impl EventRing {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Producer hot path: never allocates, never blocks, never takes a lock.
    /// Returns `false` (and increments the drop counter) if the ring is
    /// full — i.e. the consumer is too slow to keep the claimed slot free.
    pub fn push(&self, bytes: &[u8]) -> bool {
        let n = bytes.len().min(EVENT_MAX_SIZE - 1);
        let pos = self.write_pos.fetch_add(1, Ordering::Relaxed);
        let idx = (pos & RING_MASK) as usize;
        let slot = &self.slots[idx];

        if slot
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // SAFETY: this thread alone holds the slot in WRITING state.
        unsafe {
            let buf = &mut *slot.buf.get();
            buf[..n].copy_from_slice(&bytes[..n]);
            *slot.len.get() = n;
        }

        slot.state.store(READY, Ordering::Release);
        self.queued.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn stats(&self) -> RingStats {
        RingStats {
            queued: self.queued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            batch_count: self.batch_count.load(Ordering::Relaxed),
            write_pos: self.write_pos.load(Ordering::Relaxed),
            read_pos: self.read_pos.load(Ordering::Relaxed),
        }
    }

    /// Drains at most `BATCH_MAX` consecutive READY slots starting at
    /// `read_pos`, invoking `emit` with each payload, then frees every
    /// collected slot back to EMPTY and advances `read_pos`. Returns the
    /// number of slots drained. A passive caller (no socket) can use this
    /// directly for the "no-loss-under-capacity" property.
    pub fn drain_batch(&self, mut emit: impl FnMut(&[u8])) -> usize {
        let start = self.read_pos.load(Ordering::Relaxed);
        let mut count = 0usize;

        while count < BATCH_MAX {
            let idx = ((start + count as u64) & RING_MASK) as usize;
            let slot = &self.slots[idx];
            if slot.state.load(Ordering::Acquire) != READY {
                break;
            }
            // SAFETY: slot is READY, meaning the producer finished writing
            // and the drainer is the sole reader until it flips state back
            // to EMPTY below.
            let payload = unsafe {
                let len = *slot.len.get();
                let buf = &*slot.buf.get();
                &buf[..len]
            };
            emit(payload);
            count += 1;
        }

        for i in 0..count {
            let idx = ((start + i as u64) & RING_MASK) as usize;
            self.slots[idx].state.store(EMPTY, Ordering::Release);
        }

        if count > 0 {
            self.read_pos.fetch_add(count as u64, Ordering::Relaxed);
            self.events_sent.fetch_add(count as u64, Ordering::Relaxed);
            self.batch_count.fetch_add(1, Ordering::Relaxed);
        }

        count
    }
}

impl Default for EventRing {
    fn default() -> Self {
        let mut slots = Vec::with_capacity(RING_SIZE);
        slots.resize_with(RING_SIZE, Slot::new);
        Self {
            slots: slots.into_boxed_slice(),
            write_pos: AtomicU64::new(0),
            read_pos: AtomicU64::new(0),
            queued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            events_sent: AtomicU64::new(0),
            batch_count: AtomicU64::new(0),
        }
    }
}

fn is_recoverable(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(e.kind(), WouldBlock | ConnectionRefused | NotFound)
}

/// Drives the ring's drainer loop: scans for a batch of READY slots, sends
/// each as its own datagram on `socket`, frees the slots regardless of send
/// outcome, and sleeps briefly when idle. Runs until `cancel` fires, then
/// performs one final drain so nothing is stranded mid-shutdown.
#[tracing::instrument(skip(ring, socket, cancel))]
pub async fn run_drainer(ring: Arc<EventRing>, socket: UnixDatagram, cancel: CancellationToken) {
    info!("event ring drainer starting");
    loop {
        let drained = drain_to_socket(&ring, &socket);
        if drained == 0 {
            tokio::select! {
                _ = tokio::time::sleep(IDLE_SLEEP) => {}
                _ = cancel.cancelled() => break,
            }
        } else if cancel.is_cancelled() {
            break;
        }
    }
    // Final drain so nothing queued just before shutdown is stranded.
    drain_to_socket(&ring, &socket);
    info!("event ring drainer stopped");
}

fn drain_to_socket(ring: &EventRing, socket: &UnixDatagram) -> usize {
    let mut logged_error = false;
    let drained = ring.drain_batch(|payload| match socket.try_send(payload) {
        Ok(_) => {}
        Err(e) if is_recoverable(&e) => {}
        Err(e) => {
            if !logged_error {
                warn!(error = %e, "event ring: send failed");
                logged_error = true;
            }
        }
    });
    drained
}
