// Relay server configuration.
//
// Centralizes environment variable parsing with defaults for local
// development.

use std::net::SocketAddr;

/// Default per-connection outbound frame buffer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Core relay server configuration.
///
/// Constructed via [`RelayConfig::from_env`] which reads environment
/// variables and falls back to development defaults.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Listen address (host:port).
    pub listen_addr: SocketAddr,
    /// Comma-separated CORS origins (or `"*"` for any).
    pub cors_origins: Option<String>,
    /// Log filter directive (e.g. `info`, `folio_relay=debug`).
    pub log_filter: String,
    /// Frames buffered per channel connection before new ones are dropped.
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_env_fn(|_| Err(std::env::VarError::NotPresent))
    }
}

impl RelayConfig {
    /// Parse configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `FOLIO_RELAY_HOST` | `0.0.0.0` |
    /// | `FOLIO_RELAY_PORT` | `8080` |
    /// | `FOLIO_RELAY_CORS_ORIGINS` | *(none, cors.rs uses dev defaults)* |
    /// | `FOLIO_RELAY_LOG_FILTER` | `info` |
    /// | `FOLIO_RELAY_CHANNEL_CAPACITY` | `256` |
    pub fn from_env() -> Self {
        Self::from_env_fn(|key| std::env::var(key))
    }

    /// Testable constructor that accepts an environment lookup function.
    fn from_env_fn<F>(env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let host = env("FOLIO_RELAY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env("FOLIO_RELAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);
        let listen_addr = format!("{host}:{port}")
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], port)));

        let cors_origins = env("FOLIO_RELAY_CORS_ORIGINS").ok();
        let log_filter = env("FOLIO_RELAY_LOG_FILTER").unwrap_or_else(|_| "info".into());

        let channel_capacity = env("FOLIO_RELAY_CHANNEL_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|capacity: &usize| *capacity > 0)
            .unwrap_or(DEFAULT_CHANNEL_CAPACITY);

        Self { listen_addr, cors_origins, log_filter, channel_capacity }
    }
}
