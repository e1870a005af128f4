use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid redis url {0:?}: {1}")]
    InvalidRedisUrl(String, String),

    #[error("invalid host:port {0:?}: {1}")]
    InvalidHostPort(String, String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
