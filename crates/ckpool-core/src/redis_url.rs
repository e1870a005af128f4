//! Parses the restricted `redis://host[:port][/db]` URL form used by the
//! refreshable caches. We don't need (or want) general URL parsing here —
//! just enough to recover a host, port, and db index for opening a fresh
//! connection once per refresh cycle.

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisTarget {
    pub host: String,
    pub port: u16,
    pub db: u32,
}

impl RedisTarget {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url.strip_prefix("redis://").ok_or_else(|| {
            ConfigError::InvalidRedisUrl(url.to_string(), "missing redis:// scheme".into())
        })?;

        let (authority, db) = match rest.split_once('/') {
            Some((authority, db_str)) if !db_str.is_empty() => {
                let db = db_str.parse::<u32>().map_err(|e| {
                    ConfigError::InvalidRedisUrl(url.to_string(), format!("bad db index: {e}"))
                })?;
                (authority, db)
            }
            Some((authority, _)) => (authority, 0),
            None => (rest, 0),
        };

        if authority.is_empty() {
            return Err(ConfigError::InvalidRedisUrl(
                url.to_string(),
                "empty host".into(),
            ));
        }

        let (host, port) = match authority.split_once(':') {
            Some((host, port_str)) => {
                let port = port_str.parse::<u16>().map_err(|e| {
                    ConfigError::InvalidRedisUrl(url.to_string(), format!("bad port: {e}"))
                })?;
                (host.to_string(), port)
            }
            None => (authority.to_string(), 6379),
        };

        Ok(Self { host, port, db })
    }

    pub fn to_connection_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_only() {
        let t = RedisTarget::parse("redis://redis").unwrap();
        assert_eq!(t.host, "redis");
        assert_eq!(t.port, 6379);
        assert_eq!(t.db, 0);
    }

    #[test]
    fn parses_host_port() {
        let t = RedisTarget::parse("redis://cache.local:6380").unwrap();
        assert_eq!(t.host, "cache.local");
        assert_eq!(t.port, 6380);
        assert_eq!(t.db, 0);
    }

    #[test]
    fn parses_host_port_db() {
        let t = RedisTarget::parse("redis://cache.local:6380/3").unwrap();
        assert_eq!(t.host, "cache.local");
        assert_eq!(t.port, 6380);
        assert_eq!(t.db, 3);
    }

    #[test]
    fn parses_host_db_no_port() {
        let t = RedisTarget::parse("redis://cache.local/2").unwrap();
        assert_eq!(t.host, "cache.local");
        assert_eq!(t.port, 6379);
        assert_eq!(t.db, 2);
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(RedisTarget::parse("cache.local:6379").is_err());
    }

    #[test]
    fn rejects_bad_port() {
        assert!(RedisTarget::parse("redis://cache.local:notaport").is_err());
    }
}
