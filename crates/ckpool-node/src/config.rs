//! Layered configuration: `clap` derive with `env` fallbacks on every
//! field, flattened into logically grouped sub-arg structs. No config file
//! format is introduced — flags and environment variables are the only two
//! sources, matching §10.4 of this crate's specification.

use std::time::Duration;

use ckpool_core::RedisTarget;
use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "ckpool-node")]
#[command(author, version, about = "Stratum mining-pool infrastructure node", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub rate_limiter: RateLimiterArgs,

    #[command(flatten)]
    pub relay: RelayArgs,

    #[command(flatten)]
    pub cache: CacheArgs,

    #[command(flatten)]
    pub vardiff: VarDiffArgs,

    #[command(flatten)]
    pub metrics: MetricsArgs,

    /// Path to the Unix datagram socket the event-ring drainer sends to.
    #[arg(long, env = "EVENT_SOCKET_PATH", default_value = "/tmp/ckpool-events.sock")]
    pub event_socket_path: String,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RateLimiterArgs {
    /// Per-IP connect admissions allowed per minute.
    #[arg(long, env = "CONNECTIONS_PER_IP_PER_MINUTE", default_value_t = 10)]
    pub connections_per_ip_per_minute: u32,

    /// Maximum concurrently active connections from a single IP.
    #[arg(long, env = "MAX_CONNECTIONS_PER_IP", default_value_t = 20)]
    pub max_connections_per_ip: u32,

    /// Maximum concurrently active connections across the whole process.
    #[arg(long, env = "GLOBAL_MAX_CONNECTIONS", default_value_t = 10_000)]
    pub global_max_connections: u32,

    /// How long a soft-banned IP is refused admission, in seconds.
    #[arg(long, env = "SOFTBAN_DURATION_SECONDS", default_value_t = 300)]
    pub softban_duration_seconds: u64,

    /// Per-connection `mining.subscribe` admissions allowed per minute.
    #[arg(long, env = "MAX_SUBSCRIBES_PER_MINUTE", default_value_t = 5)]
    pub max_subscribes_per_minute: u32,

    /// Per-connection `mining.authorize` admissions allowed per minute.
    #[arg(long, env = "MAX_AUTHORIZES_PER_MINUTE", default_value_t = 5)]
    pub max_authorizes_per_minute: u32,

    /// Per-connection `mining.submit` admissions allowed per minute.
    #[arg(long, env = "MAX_SHARES_PER_MINUTE", default_value_t = 300)]
    pub max_shares_per_minute: u32,

    /// Per-connection invalid-share admissions allowed per minute before a
    /// caller should consider soft-banning the IP.
    #[arg(long, env = "MAX_INVALID_SHARES_PER_MINUTE", default_value_t = 20)]
    pub max_invalid_shares_per_minute: u32,
}

impl RateLimiterArgs {
    pub fn limiter_config(&self) -> ckpool_ratelimit::RateLimiterConfig {
        ckpool_ratelimit::RateLimiterConfig {
            connections_per_ip_per_minute: self.connections_per_ip_per_minute,
            max_connections_per_ip: self.max_connections_per_ip,
            global_max_connections: self.global_max_connections,
            softban_duration_seconds: self.softban_duration_seconds,
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct RelayArgs {
    /// TCP port the relay primary listens on. Only consulted when
    /// `--relay-mode primary` is selected.
    #[arg(long, env = "RELAY_LISTEN_PORT", default_value_t = ckpool_relay::DEFAULT_RELAY_PORT)]
    pub relay_listen_port: u16,

    /// `host:port` of the primary this node relays from. Only consulted
    /// when `--relay-mode relay` is selected.
    #[arg(long, env = "PRIMARY_URL")]
    pub primary_url: Option<String>,

    /// Seconds of heartbeat silence from the primary before this relay
    /// falls over to independent mode.
    #[arg(long, env = "FAILOVER_TIMEOUT_SECONDS", default_value_t = 30)]
    pub failover_timeout_seconds: u64,

    /// This relay's region tag, sent in its REGISTER frame.
    #[arg(long, env = "REGION", default_value = "default")]
    pub region: String,

    /// Which side of the relay protocol this process runs: `primary`,
    /// `relay`, or `none` (neither — useful for a pure validation/metrics
    /// node in a test harness).
    #[arg(long, env = "RELAY_MODE", default_value = "none")]
    pub relay_mode: RelayMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum RelayMode {
    Primary,
    Relay,
    None,
}

impl RelayArgs {
    pub fn failover_timeout(&self) -> Duration {
        Duration::from_secs(self.failover_timeout_seconds)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct CacheArgs {
    /// `redis://host[:port][/db]` backing the coinbase-signature and
    /// vardiff reconnect caches. Both caches run in pure in-memory mode
    /// (no background persistence) if this is absent.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,
}

impl CacheArgs {
    pub fn redis_target(&self) -> ckpool_core::Result<Option<RedisTarget>> {
        self.redis_url
            .as_deref()
            .map(RedisTarget::parse)
            .transpose()
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct VarDiffArgs {
    /// Target `mining.submit` rate per worker, in shares per minute.
    #[arg(long, env = "VARDIFF_TARGET_SHARES_PER_MINUTE", default_value_t = 1.5)]
    pub vardiff_target_shares_per_minute: f64,

    /// Floor a worker's difficulty is ever clamped to.
    #[arg(long, env = "VARDIFF_MINDIFF", default_value_t = 1)]
    pub vardiff_mindiff: i64,

    /// Ceiling a worker's difficulty is ever clamped to.
    #[arg(long, env = "VARDIFF_MAXDIFF", default_value_t = 1_000_000_000)]
    pub vardiff_maxdiff: i64,

    /// Multiplicative cap on a single fast-ramp jump.
    #[arg(long, env = "VARDIFF_FAST_RAMP_MAX_JUMP", default_value_t = 8.0)]
    pub vardiff_fast_ramp_max_jump: f64,

    /// Difficulty assigned to a worker with no reconnect-memory entry.
    #[arg(long, env = "VARDIFF_DEFAULT_DIFFICULTY", default_value_t = 2048)]
    pub vardiff_default_difficulty: i64,
}

impl VarDiffArgs {
    pub fn vardiff_config(&self) -> ckpool_cache::VarDiffConfig {
        ckpool_cache::VarDiffConfig {
            mindiff: self.vardiff_mindiff,
            maxdiff: self.vardiff_maxdiff,
            target_shares_per_minute: self.vardiff_target_shares_per_minute,
            fast_ramp_max_jump: self.vardiff_fast_ramp_max_jump,
            default_difficulty: self.vardiff_default_difficulty,
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct MetricsArgs {
    /// TCP port the Prometheus text-exposition endpoint listens on.
    #[arg(long, env = "METRICS_PORT", default_value_t = 9100)]
    pub metrics_port: u16,
}
