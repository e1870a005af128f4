//! The process-wide `App` aggregate: every singleton subsystem described in
//! §9's "global mutable state" note (metrics registry, event ring, rate
//! limiter, caches, relay state), constructed once in `main` and handed to
//! every spawned task by `Arc` clone rather than via ambient globals.

use std::sync::Arc;

use bytes::Bytes;
use ckpool_cache::{SignatureCache, VarDiffCache, VarDiffConfig};
use ckpool_core::{Shutdown, SystemClock};
use ckpool_metrics::Metrics;
use ckpool_ratelimit::RateLimiter;
use ckpool_relay::{BlockFoundHandler, RelayClient, RelayPrimary};
use ckpool_ring::EventRing;
use tokio::net::UnixDatagram;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{Cli, RelayMode};

pub struct App {
    pub metrics: Arc<Metrics>,
    pub event_ring: Arc<EventRing>,
    pub rate_limiter: Arc<RateLimiter>,
    pub signature_cache: Arc<SignatureCache>,
    pub vardiff_cache: Arc<VarDiffCache>,
    pub vardiff_config: VarDiffConfig,
    pub relay_primary: Option<Arc<RelayPrimary>>,
    pub relay_client: Option<Arc<RelayClient>>,
    pub shutdown: Shutdown,
    cli: Cli,
}

impl App {
    pub fn new(cli: Cli) -> anyhow::Result<Arc<Self>> {
        let clock = Arc::new(SystemClock);
        let redis_target = cli.cache.redis_target()?;

        let metrics = Arc::new(Metrics::new());
        let event_ring = EventRing::new();
        let rate_limiter = RateLimiter::new(cli.rate_limiter.limiter_config(), clock.clone());
        let signature_cache = SignatureCache::new(redis_target.clone());
        let vardiff_cache = VarDiffCache::new(redis_target, clock.clone());
        let vardiff_config = cli.vardiff.vardiff_config();

        let (relay_primary, relay_client) = match cli.relay.relay_mode {
            RelayMode::Primary => {
                let handler = default_block_found_handler(metrics.clone());
                (Some(RelayPrimary::new(clock.clone(), handler)), None)
            }
            RelayMode::Relay => {
                let ring_for_templates = event_ring.clone();
                let on_template: ckpool_relay::TemplateHandler = Arc::new(move |payload| {
                    ring_for_templates.push(&payload);
                });
                let client = RelayClient::new(
                    cli.relay.region.clone(),
                    cli.relay.failover_timeout(),
                    clock.clone(),
                    on_template,
                );
                (None, Some(client))
            }
            RelayMode::None => (None, None),
        };

        Ok(Arc::new(Self {
            metrics,
            event_ring,
            rate_limiter,
            signature_cache,
            vardiff_cache,
            vardiff_config,
            relay_primary,
            relay_client,
            shutdown: Shutdown::new(),
            cli,
        }))
    }

    /// Spawns every long-lived task described in §5, each under its own
    /// child of the shared cancellation tree, and returns their handles so
    /// `main` can await them all during shutdown.
    pub async fn spawn_subsystems(self: &Arc<Self>) -> anyhow::Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        let drainer_socket = connect_event_socket(&self.cli.event_socket_path).await;
        let ring = self.event_ring.clone();
        let drainer_cancel = self.shutdown.subsystem();
        handles.push(tokio::spawn(async move {
            ckpool_ring::run_drainer(ring, drainer_socket, drainer_cancel).await;
        }));

        let limiter = self.rate_limiter.clone();
        let reaper_cancel = self.shutdown.subsystem();
        handles.push(tokio::spawn(async move {
            ckpool_ratelimit::run_reaper(limiter, reaper_cancel).await;
        }));

        let sig_cache = self.signature_cache.clone();
        let sig_cancel = self.shutdown.subsystem();
        handles.push(tokio::spawn(async move {
            sig_cache.run_refresher(sig_cancel).await;
        }));

        let vardiff_cache = self.vardiff_cache.clone();
        let vardiff_cancel = self.shutdown.subsystem();
        handles.push(tokio::spawn(async move {
            vardiff_cache.run_persister(vardiff_cancel).await;
        }));

        let metrics = self.metrics.clone();
        let metrics_port = self.cli.metrics.metrics_port;
        let metrics_cancel = self.shutdown.subsystem();
        handles.push(tokio::spawn(async move {
            if let Err(e) = ckpool_metrics::run_metrics_server(metrics, metrics_port, metrics_cancel).await {
                warn!(error = %e, "metrics server exited with an error");
            }
        }));

        if let Some(primary) = &self.relay_primary {
            let primary = primary.clone();
            let port = self.cli.relay.relay_listen_port;
            let relay_cancel = self.shutdown.subsystem();
            handles.push(tokio::spawn(async move {
                if let Err(e) = primary.run(port, relay_cancel).await {
                    warn!(error = %e, "relay primary exited with an error");
                }
            }));
        }

        if let Some(client) = &self.relay_client {
            let Some(addr) = self.cli.relay.primary_url.clone() else {
                warn!("relay mode is 'relay' but no --primary-url was given; skipping relay client");
                return Ok(handles);
            };
            let client = client.clone();
            let client_cancel = self.shutdown.subsystem();
            handles.push(tokio::spawn(async move {
                client.run(addr, client_cancel).await;
            }));
        }

        Ok(handles)
    }
}

/// The default BLOCK_FOUND wiring per §9's resolved open question: log at
/// INFO and bump the metric. A real generator submission path is an
/// integration a caller of this crate owns.
fn default_block_found_handler(metrics: Arc<Metrics>) -> BlockFoundHandler {
    Arc::new(move |payload: Bytes| {
        let metrics = metrics.clone();
        Box::pin(async move {
            info!(bytes = payload.len(), "block found payload received from relay peer");
            metrics.inc_blocks_found();
        })
    })
}

/// Binds an ephemeral Unix datagram socket and connects it to the event
/// socket path. A missing listener at startup is not fatal — per §7,
/// `ENOENT`/`ECONNREFUSED` on the event socket are transient/recoverable
/// errors the drainer already swallows on every send attempt.
async fn connect_event_socket(path: &str) -> UnixDatagram {
    let socket = UnixDatagram::unbound().expect("failed to create unix datagram socket");
    if let Err(e) = socket.connect(path) {
        warn!(error = %e, path, "event socket not reachable yet; drainer will retry sends");
    }
    socket
}
