//! Environment configuration for the API binary.

use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8002";
pub const DEFAULT_EVENTS_LIMIT: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("MAPPER_LISTEN is not a socket address: {0}")]
    Listen(String),
    #[error("MAPPER_DEFAULT_EVENTS_LIMIT is not an integer: {0}")]
    EventsLimit(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub listen: SocketAddr,
    /// SQLite file for mappings and audit records; honoured only with the `sqlite` feature.
    pub sqlite_path: Option<PathBuf>,
    /// JSONL audit log, used when SQLite is not.
    pub audit_log: Option<PathBuf>,
    /// `eventsLimit` applied when an audit query omits it.
    pub default_events_limit: i64,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let listen_raw = non_empty("MAPPER_LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = listen_raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Listen(listen_raw.clone()))?;

        let default_events_limit = match non_empty("MAPPER_DEFAULT_EVENTS_LIMIT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::EventsLimit(raw.clone()))?,
            None => DEFAULT_EVENTS_LIMIT,
        };

        Ok(Self {
            listen,
            sqlite_path: non_empty("MAPPER_SQLITE_PATH").map(PathBuf::from),
            audit_log: non_empty("MAPPER_AUDIT_LOG").map(PathBuf::from),
            default_events_limit,
        })
    }
}
