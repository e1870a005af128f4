pub mod clock;
pub mod error;
pub mod redis_url;
pub mod shutdown;

pub use clock::{Clock, SystemClock, TestClock};
pub use error::{ConfigError, Result};
pub use redis_url::RedisTarget;
pub use shutdown::Shutdown;
