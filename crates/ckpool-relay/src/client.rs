//! Relay client: the generator-side connection to a primary relay server.
//! Walks DISCONNECTED -> CONNECTING -> CONNECTED -> INDEPENDENT, and back to
//! CONNECTED on a successful reconnect — the client keeps retrying in the
//! background even while independent, and resumes template delivery the
//! moment a reconnect succeeds.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ckpool_core::Clock;
use parking_lot::Mutex as SyncMutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::frame::{self, MessageType};

pub const HB_INTERVAL: Duration = Duration::from_secs(3);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Independent = 3,
}

impl ClientState {
    fn from_u8(b: u8) -> Self {
        match b {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Independent,
            _ => Self::Disconnected,
        }
    }
}

/// Invoked with a TEMPLATE payload while the client is CONNECTED. Not called
/// while the client is INDEPENDENT; resumes once a reconnect succeeds.
pub type TemplateHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

pub struct RelayClient {
    state: AtomicU8,
    writer: AsyncMutex<Option<tokio::net::tcp::OwnedWriteHalf>>,
    last_contact: SyncMutex<u64>,
    clock: Arc<dyn Clock>,
    region: String,
    failover_timeout: Duration,
    on_template: TemplateHandler,
}

impl RelayClient {
    pub fn new(
        region: impl Into<String>,
        failover_timeout: Duration,
        clock: Arc<dyn Clock>,
        on_template: TemplateHandler,
    ) -> Arc<Self> {
        let now = clock.now();
        Arc::new(Self {
            state: AtomicU8::new(ClientState::Disconnected as u8),
            writer: AsyncMutex::new(None),
            last_contact: SyncMutex::new(now),
            clock,
            region: region.into(),
            failover_timeout,
            on_template,
        })
    }

    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ClientState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn is_independent(&self) -> bool {
        self.state() == ClientState::Independent
    }

    fn touch_contact(&self) {
        *self.last_contact.lock() = self.clock.now();
    }

    /// Sends a BLOCK_FOUND notification to the primary, if still connected.
    /// A client that has gone independent has nothing to notify — it is
    /// submitting its own blocks directly.
    pub async fn send_block(&self, payload: &[u8]) -> bool {
        if self.is_independent() {
            return false;
        }
        let frame = match frame::encode(MessageType::BlockFound, payload) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "failed to encode block-found frame");
                return false;
            }
        };
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.write_all(&frame).await.is_ok(),
            None => false,
        }
    }

    /// Connects to `addr`, registers, and runs the read/heartbeat loop,
    /// reconnecting on failure until cancelled. A silent primary drives the
    /// client to INDEPENDENT, but the reconnect attempts never stop: a
    /// successful reconnect clears the flag and template delivery resumes.
    #[tracing::instrument(skip(self, cancel), fields(region = %self.region))]
    pub async fn run(self: Arc<Self>, addr: String, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }

            self.set_state(ClientState::Connecting);
            let stream = match TcpStream::connect(&addr).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, %addr, "relay client connect failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => continue,
                        _ = cancel.cancelled() => return,
                    }
                }
            };
            let _ = stream.set_nodelay(true);

            let (mut read_half, mut write_half) = stream.into_split();
            if frame::write_frame(&mut write_half, MessageType::Register, self.region.as_bytes())
                .await
                .is_err()
            {
                continue;
            }
            *self.writer.lock().await = Some(write_half);
            self.touch_contact();
            self.set_state(ClientState::Connected);
            info!(%addr, "relay client connected");

            let hb_cancel = cancel.clone();
            let hb_self = self.clone();
            let hb_handle = tokio::spawn(run_heartbeat(hb_self, hb_cancel));
            let mut went_independent = false;

            loop {
                tokio::select! {
                    result = frame::read_frame(&mut read_half) => {
                        match result {
                            Ok((MessageType::Template, payload)) => {
                                self.touch_contact();
                                (self.on_template)(payload);
                            }
                            Ok((MessageType::Heartbeat, _)) => {
                                self.touch_contact();
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(error = %e, "relay client read failed");
                                break;
                            }
                        }
                    }
                    _ = tokio::time::sleep(self.failover_timeout) => {
                        let last = *self.last_contact.lock();
                        let elapsed = self.clock.now().saturating_sub(last);
                        if elapsed >= self.failover_timeout.as_secs() {
                            warn!(elapsed, "relay primary unresponsive, going independent");
                            self.set_state(ClientState::Independent);
                            went_independent = true;
                            break;
                        }
                    }
                    _ = cancel.cancelled() => {
                        hb_handle.abort();
                        *self.writer.lock().await = None;
                        self.set_state(ClientState::Disconnected);
                        return;
                    }
                }
            }

            hb_handle.abort();
            *self.writer.lock().await = None;
            if !went_independent {
                self.set_state(ClientState::Disconnected);
            }
        }
    }
}

async fn run_heartbeat(client: Arc<RelayClient>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(HB_INTERVAL) => {
                let frame = match frame::encode(MessageType::Heartbeat, b"") {
                    Ok(f) => f,
                    Err(_) => continue,
                };
                let mut writer = client.writer.lock().await;
                match writer.as_mut() {
                    Some(w) => {
                        if w.write_all(&frame).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}
