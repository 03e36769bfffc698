//! Server configuration.
//!
//! Everything deployment-specific is injected here: listen addresses, the
//! storage target and the token signing secret. The secret has no default.
//!
//! | Variable                       | Meaning                              | Default          |
//! |--------------------------------|--------------------------------------|------------------|
//! | `QUIRE_BIND_ADDR`              | WebSocket listen address             | `127.0.0.1:9090` |
//! | `QUIRE_HTTP_ADDR`              | REST listen address                  | `127.0.0.1:9091` |
//! | `QUIRE_DATA_DIR`               | RocksDB directory                    | in-memory        |
//! | `QUIRE_JWT_SECRET`             | HS256 signing secret                 | required         |
//! | `QUIRE_TOKEN_TTL_SECS`         | Lifetime of issued tokens            | `86400`          |
//! | `QUIRE_CHECKPOINT_INTERVAL_MS` | Server-side checkpoint tick, 0 = off | `2000`           |
//! | `QUIRE_CHECKPOINT_ON_EVICT`    | Flush dirty rooms on eviction        | `false`          |

use std::path::PathBuf;
use std::time::Duration;

use crate::auth::DEFAULT_TOKEN_TTL;
use crate::checkpoint::DEFAULT_CHECKPOINT_INTERVAL;

/// Where room snapshots are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Lost on restart; for development and tests.
    Memory,
    RocksDb(PathBuf),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// WebSocket bind address (e.g., "127.0.0.1:9090")
    pub bind_addr: String,
    /// REST bind address (e.g., "127.0.0.1:9091")
    pub http_addr: String,
    pub storage: StorageBackend,
    /// HS256 secret for session tokens
    pub jwt_secret: String,
    pub token_ttl: Duration,
    /// Server-side dirty-room checkpoint period (`None` = disabled)
    pub checkpoint_interval: Option<Duration>,
    pub checkpoint_on_evict: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            http_addr: "127.0.0.1:9091".to_string(),
            storage: StorageBackend::Memory,
            jwt_secret: String::new(),
            token_ttl: DEFAULT_TOKEN_TTL,
            checkpoint_interval: Some(DEFAULT_CHECKPOINT_INTERVAL),
            checkpoint_on_evict: false,
        }
    }
}

impl ServerConfig {
    /// Read configuration from `QUIRE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (environment, test map, …).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(addr) = lookup("QUIRE_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(addr) = lookup("QUIRE_HTTP_ADDR") {
            config.http_addr = addr;
        }
        if let Some(dir) = lookup("QUIRE_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.storage = StorageBackend::RocksDb(PathBuf::from(dir));
        }

        config.jwt_secret = lookup("QUIRE_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("QUIRE_JWT_SECRET"))?;

        if let Some(secs) = parse::<u64>(&lookup, "QUIRE_TOKEN_TTL_SECS")? {
            config.token_ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = parse::<u64>(&lookup, "QUIRE_CHECKPOINT_INTERVAL_MS")? {
            config.checkpoint_interval = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(flag) = parse::<bool>(&lookup, "QUIRE_CHECKPOINT_ON_EVICT")? {
            config.checkpoint_on_evict = flag;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}
