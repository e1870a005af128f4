pub mod entry;
pub mod limiter;
pub mod token_bucket;

pub use entry::{ConnectionState, IpEntry, MessageKind};
pub use limiter::{run_reaper, RateLimiter, RateLimiterConfig, RATE_CLEANUP_INTERVAL, RATE_STALE_THRESHOLD};
pub use token_bucket::TokenBucket;
