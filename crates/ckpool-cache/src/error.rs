use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedisCacheError {
    #[error("failed to open redis client: {0}")]
    Open(#[source] redis::RedisError),

    #[error("failed to establish redis connection: {0}")]
    Connect(#[source] redis::RedisError),

    #[error("redis command failed: {0}")]
    Command(#[source] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, RedisCacheError>;
