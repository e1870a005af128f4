//! Primary-side relay server: accepts relay connections, fans template
//! updates out to all of them, and reaps any peer that goes quiet.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use ckpool_core::Clock;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::frame::{self, MessageType};
use crate::peer::PeerTable;

pub const DEFAULT_RELAY_PORT: u16 = 8881;
pub const HB_INTERVAL: Duration = Duration::from_secs(3);
const READER_DEADLINE: Duration = Duration::from_secs(2);

/// Callback invoked with a BLOCK_FOUND payload. Resolves the open question
/// in the specification: rather than the primary-side server silently
/// dropping the payload, it is handed to whatever the caller wired up (log
/// + metrics by default in the binary crate; a real generator submission
/// path is an integration the caller owns).
pub type BlockFoundHandler =
    Arc<dyn Fn(Bytes) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct RelayPrimary {
    peers: Arc<PeerTable>,
    clock: Arc<dyn Clock>,
    block_found: BlockFoundHandler,
}

impl RelayPrimary {
    pub fn new(clock: Arc<dyn Clock>, block_found: BlockFoundHandler) -> Arc<Self> {
        Arc::new(Self {
            peers: Arc::new(PeerTable::new()),
            clock,
            block_found,
        })
    }

    /// Sends a TEMPLATE frame to every currently active peer. Per the
    /// specification, this is not atomic with respect to peer membership: a
    /// peer that joins mid-push simply receives the next template instead.
    /// A failed send does not itself deactivate the peer — the heartbeat
    /// task owns liveness.
    #[tracing::instrument(skip(self, payload))]
    pub async fn push_template(&self, payload: &[u8]) {
        let peers = self.peers.active_peers();
        for peer in peers {
            let frame = match frame::encode(MessageType::Template, payload) {
                Ok(f) => f,
                Err(e) => {
                    warn!(error = %e, "failed to encode template frame");
                    return;
                }
            };
            let mut writer = peer.writer.lock().await;
            if let Err(e) = writer.write_all(&frame).await {
                warn!(error = %e, "template push failed for one peer");
            }
        }
    }

    pub fn active_peer_count(&self) -> usize {
        self.peers.len_active()
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn run(self: Arc<Self>, port: u16, cancel: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port, "relay primary listening");

        let hb_cancel = cancel.clone();
        let hb_peers = self.peers.clone();
        let hb_clock = self.clock.clone();
        let hb_handle = tokio::spawn(run_heartbeat(hb_peers, hb_clock, hb_cancel));

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                warn!(error = %e, "failed to set TCP_NODELAY");
                            }
                            let sock = socket2::SockRef::from(&stream);
                            let _ = sock.set_keepalive(true);
                            self.clone().accept_peer(stream, addr.to_string()).await;
                        }
                        Err(e) => warn!(error = %e, "relay accept failed"),
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }

        hb_handle.abort();
        info!("relay primary stopped");
        Ok(())
    }

    async fn accept_peer(self: Arc<Self>, stream: TcpStream, addr: String) {
        let now = self.clock.now();
        let (read_half, write_half) = stream.into_split();
        let Some((idx, peer)) = self.peers.reserve(write_half, now) else {
            warn!(%addr, "relay peer table full, closing connection");
            return;
        };
        info!(%addr, slot = idx, "relay peer connected");
        tokio::spawn(run_peer_reader(self, peer, read_half));
    }
}

async fn run_peer_reader(
    primary: Arc<RelayPrimary>,
    peer: Arc<crate::peer::PeerSlot>,
    mut reader: tokio::net::tcp::OwnedReadHalf,
) {
    loop {
        let frame_result =
            tokio::time::timeout(READER_DEADLINE, frame::read_frame(&mut reader)).await;

        let (msg_type, payload) = match frame_result {
            Ok(Ok(f)) => f,
            Ok(Err(e)) => {
                warn!(error = %e, "relay peer read failed");
                peer.deactivate();
                return;
            }
            Err(_timeout) => continue,
        };

        let now = primary.clock.now();
        match msg_type {
            MessageType::Register => peer.set_region(&payload),
            MessageType::Heartbeat => peer.touch_heartbeat(now),
            MessageType::BlockFound => {
                (primary.block_found)(payload).await;
            }
            MessageType::Template | MessageType::ConfigSync => {
                // Primary never expects to receive these; ignore.
            }
        }
    }
}

async fn run_heartbeat(peers: Arc<PeerTable>, clock: Arc<dyn Clock>, cancel: CancellationToken) {
    info!("relay primary heartbeat task starting");
    loop {
        tokio::select! {
            _ = tokio::time::sleep(HB_INTERVAL) => {
                let now = clock.now();
                for peer in peers.active_peers() {
                    let frame = match frame::encode(MessageType::Heartbeat, b"") {
                        Ok(f) => f,
                        Err(_) => continue,
                    };
                    let send_ok = {
                        let mut writer = peer.writer.lock().await;
                        writer.write_all(&frame).await.is_ok()
                    };
                    if !send_ok {
                        peer.deactivate();
                        continue;
                    }
                    let last = peer.last_heartbeat.load(Ordering::Relaxed);
                    if now.saturating_sub(last) > 3 * HB_INTERVAL.as_secs() {
                        peer.deactivate();
                    }
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    info!("relay primary heartbeat task stopped");
}
