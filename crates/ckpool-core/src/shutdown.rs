//! Process-wide cancellation tree.
//!
//! A single parent [`tokio_util::sync::CancellationToken`] is cancelled once,
//! from the Ctrl-C / SIGTERM handler installed in `main`. Every long-lived
//! subsystem task is handed a child token (`child_token()`) so cancelling the
//! parent cancels every child without each subsystem needing its own signal
//! wiring.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug)]
pub struct Shutdown {
    token: CancellationToken,
    started: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// A token for one subsystem; cancelling the parent cancels this too.
    pub fn subsystem(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Begin shutdown. Idempotent: only the first call actually cancels.
    pub fn initiate(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("🛑 initiating shutdown");
        self.token.cancel();
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
