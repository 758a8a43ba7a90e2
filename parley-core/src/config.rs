//! Client configuration

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::reconnect::ReconnectConfig;

/// Endpoint used when nothing else is configured
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3001";

/// Environment variable overriding the transport endpoint
pub const ENDPOINT_ENV: &str = "PARLEY_SOCKET_URL";

/// Environment variable carrying the informational API base URL
pub const API_URL_ENV: &str = "PARLEY_API_URL";

/// Kinds of transport a connection may be carried over, in preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Persistent streaming socket
    #[serde(rename = "websocket")]
    WebSocket,
    /// HTTP long-polling fallback
    Polling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::WebSocket => f.write_str("websocket"),
            TransportKind::Polling => f.write_str("polling"),
        }
    }
}

/// Wire protocol spoken with the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Socket.IO, with identity and token sent in the handshake auth payload
    #[default]
    SocketIo,
    /// Plain WebSocket carrying `{"event", "data"}` JSON text frames
    JsonFrames,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::SocketIo => f.write_str("socket_io"),
            Protocol::JsonFrames => f.write_str("json_frames"),
        }
    }
}

/// Default transport preference: streaming socket first, polling as fallback
pub fn default_transport_kinds() -> Vec<TransportKind> {
    vec![TransportKind::WebSocket, TransportKind::Polling]
}

/// Strip trailing slashes so path joins never produce `//`.
pub fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

/// Settings a [`Session`](crate::Session) builds its transports from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Chat backend endpoint, without trailing slashes
    pub endpoint: String,

    /// REST API base URL. Only logged for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default)]
    pub protocol: Protocol,

    /// Transport kinds to try, in order
    #[serde(default = "default_transport_kinds")]
    pub transport_kinds: Vec<TransportKind>,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_url: None,
            protocol: Protocol::default(),
            transport_kinds: default_transport_kinds(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults with the process environment applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `PARLEY_SOCKET_URL` and `PARLEY_API_URL` when set and non-empty.
    pub fn apply_env(&mut self) {
        if let Some(endpoint) = env_value(ENDPOINT_ENV) {
            self.endpoint = normalize_endpoint(&endpoint);
        }
        if let Some(api_url) = env_value(API_URL_ENV) {
            self.api_url = Some(api_url);
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = normalize_endpoint(endpoint);
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn with_transport_kinds(mut self, kinds: Vec<TransportKind>) -> Self {
        self.transport_kinds = kinds;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Log the effective endpoints once at startup.
    pub fn log_diagnostics(&self) {
        info!(
            endpoint = %self.endpoint,
            api_url = self.api_url.as_deref().unwrap_or("<unset>"),
            protocol = %self.protocol,
            transports = ?self.transport_kinds,
            reconnect_attempts = self.reconnect.max_attempts,
            "Chat client configured"
        );
    }
}

/// Read an environment variable, treating blank values as unset.
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn trailing_slashes_are_stripped() {
        assert_eq!(
            normalize_endpoint("http://chat.example.com///"),
            "http://chat.example.com"
        );
        assert_eq!(
            normalize_endpoint("http://chat.example.com/rt/"),
            "http://chat.example.com/rt"
        );
        assert_eq!(normalize_endpoint("ws://host:1"), "ws://host:1");
    }

    #[test]
    fn defaults_prefer_websocket_then_polling() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(
            config.transport_kinds,
            vec![TransportKind::WebSocket, TransportKind::Polling]
        );
        assert!(config.api_url.is_none());
        assert_eq!(config.protocol, Protocol::SocketIo);
    }

    #[test]
    fn protocol_parses_from_toml() {
        let config: ClientConfig =
            toml::from_str("endpoint = \"http://chat.local\"\nprotocol = \"json_frames\"\n")
                .unwrap();
        assert_eq!(config.protocol, Protocol::JsonFrames);

        let config: ClientConfig = toml::from_str("endpoint = \"http://chat.local\"\n").unwrap();
        assert_eq!(config.protocol, Protocol::SocketIo);
    }

    #[test]
    fn with_endpoint_normalizes() {
        let config = ClientConfig::default().with_endpoint("https://rt.example.com/");
        assert_eq!(config.endpoint, "https://rt.example.com");
    }

    #[test]
    #[serial]
    fn env_overrides_endpoint_and_api_url() {
        unsafe {
            std::env::set_var(ENDPOINT_ENV, "http://env-host:4000//");
            std::env::set_var(API_URL_ENV, "http://env-host:4000/api");
        }
        let config = ClientConfig::from_env();
        unsafe {
            std::env::remove_var(ENDPOINT_ENV);
            std::env::remove_var(API_URL_ENV);
        }
        assert_eq!(config.endpoint, "http://env-host:4000");
        assert_eq!(config.api_url.as_deref(), Some("http://env-host:4000/api"));
    }

    #[test]
    #[serial]
    fn empty_env_values_are_ignored() {
        unsafe {
            std::env::set_var(ENDPOINT_ENV, "  ");
        }
        let config = ClientConfig::from_env();
        unsafe {
            std::env::remove_var(ENDPOINT_ENV);
        }
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn toml_round_trip() {
        let config = ClientConfig::default()
            .with_endpoint("http://chat.local:9000")
            .with_transport_kinds(vec![TransportKind::WebSocket]);
        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("transport_kinds = [\"websocket\"]"));
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
