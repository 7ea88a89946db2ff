//! Client configuration.

use crate::stroke::ParticipantId;
use thiserror::Error;

/// Relay used when none is configured.
pub const DEFAULT_SERVER: &str = "localhost:3030";

/// Room joined when none is configured.
pub const DEFAULT_ROOM: &str = "default";

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for `{key}`: {value}")]
    InvalidValue { key: String, value: String },
}

/// Where and as whom a client draws.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Relay `host:port`, or a full `ws://`/`wss://` URL.
    pub server: String,
    pub room: String,
    pub participant: ParticipantId,
    /// Partition strokes into layers.
    pub layers_enabled: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            room: DEFAULT_ROOM.to_string(),
            participant: ParticipantId::random(),
            layers_enabled: false,
        }
    }
}

impl ClientConfig {
    /// Parse a query string or hash fragment such as
    /// `?room=abc&server=host:3030&user=u1&layers=1`.
    ///
    /// Unknown keys are ignored; missing keys keep their defaults.
    pub fn from_query(query: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let query = query.trim_start_matches(['?', '#']);

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let mut parts = pair.splitn(2, '=');
            let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match key {
                "room" => config.room = value.to_string(),
                "server" => config.server = value.to_string(),
                "user" => config.participant = ParticipantId::new(value),
                "layers" => config.layers_enabled = parse_flag(key, value)?,
                _ => {}
            }
        }

        Ok(config)
    }

    /// WebSocket endpoint of the relay.
    pub fn websocket_url(&self) -> String {
        if self.server.starts_with("ws://") || self.server.starts_with("wss://") {
            self.server.clone()
        } else {
            format!("ws://{}/ws", self.server.trim_end_matches('/'))
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
