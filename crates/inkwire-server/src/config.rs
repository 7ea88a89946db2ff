//! Relay configuration from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 3030;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;
pub const DEFAULT_MAX_STROKES: usize = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Capacity of each room's broadcast channel.
    pub channel_capacity: usize,
    /// Finalized strokes kept per room for snapshots; oldest are evicted.
    pub max_strokes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_strokes: DEFAULT_MAX_STROKES,
        }
    }
}

impl ServerConfig {
    /// Read `INKWIRE_HOST`, `INKWIRE_PORT`, `INKWIRE_CHANNEL_CAPACITY` and
    /// `INKWIRE_MAX_STROKES`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            host: parse_var(&lookup, "INKWIRE_HOST")?.unwrap_or(defaults.host),
            port: parse_var(&lookup, "INKWIRE_PORT")?.unwrap_or(defaults.port),
            channel_capacity: parse_var(&lookup, "INKWIRE_CHANNEL_CAPACITY")?
                .unwrap_or(defaults.channel_capacity),
            max_strokes: parse_var(&lookup, "INKWIRE_MAX_STROKES")?.unwrap_or(defaults.max_strokes),
        };

        // tokio's broadcast channel panics on zero capacity.
        if config.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "INKWIRE_CHANNEL_CAPACITY",
                value: "0".to_string(),
            });
        }
        Ok(config)
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(key) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}
