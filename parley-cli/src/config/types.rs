use std::time::Duration;

use parley_core::config::{DEFAULT_ENDPOINT, default_transport_kinds, normalize_endpoint};
use parley_core::{ClientConfig, IdInput, Protocol, ReconnectConfig, TransportKind};
use serde::{Deserialize, Serialize};

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawParleyConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub reconnect: RawReconnectConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

/// Server config as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerConfig {
    /// Chat backend endpoint
    pub endpoint: Option<String>,

    /// REST API base URL, informational
    pub api_url: Option<String>,

    /// Wire protocol: `socket_io` or `json_frames`
    pub protocol: Option<Protocol>,

    /// Transport kinds in preference order
    pub transports: Option<Vec<TransportKind>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawReconnectConfig {
    pub enabled: Option<bool>,

    pub max_attempts: Option<u32>,

    #[serde(default, with = "humantime_serde")]
    pub delay: Option<Duration>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParleyConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Chat backend endpoint, without trailing slashes
    pub endpoint: String,

    /// REST API base URL, only logged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default)]
    pub protocol: Protocol,

    /// Transport kinds in preference order
    pub transports: Vec<TransportKind>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_url: None,
            protocol: Protocol::default(),
            transports: default_transport_kinds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatConfig {
    /// User id `parley chat` connects as when `--user` is omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Rooms joined on every connect
    #[serde(default)]
    pub rooms: Vec<IdInput>,
}

impl ParleyConfig {
    /// Settings for the chat session
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default()
            .with_endpoint(&self.server.endpoint)
            .with_protocol(self.server.protocol)
            .with_transport_kinds(self.server.transports.clone())
            .with_reconnect(self.reconnect.clone());
        config.api_url = self.server.api_url.clone();
        config
    }
}

impl ServerConfig {
    pub(crate) fn from_raw(raw: RawServerConfig) -> Self {
        let defaults = Self::default();
        Self {
            endpoint: raw
                .endpoint
                .map(|e| normalize_endpoint(&e))
                .unwrap_or(defaults.endpoint),
            api_url: raw.api_url,
            protocol: raw.protocol.unwrap_or(defaults.protocol),
            transports: raw.transports.unwrap_or(defaults.transports),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ParleyConfig::default();
        assert_eq!(config.server.endpoint, "http://localhost:3001");
        assert!(config.server.api_url.is_none());
        assert_eq!(config.server.protocol, Protocol::SocketIo);
        assert_eq!(
            config.server.transports,
            vec![TransportKind::WebSocket, TransportKind::Polling]
        );
        assert!(config.reconnect.enabled);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert!(config.chat.user.is_none());
        assert!(config.chat.rooms.is_empty());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ParleyConfig {
            server: ServerConfig {
                endpoint: "https://chat.example.com".to_string(),
                api_url: Some("https://api.example.com".to_string()),
                protocol: Protocol::JsonFrames,
                transports: vec![TransportKind::WebSocket],
            },
            reconnect: ReconnectConfig::default().with_delay(Duration::from_millis(2500)),
            chat: ChatConfig {
                user: Some("42".to_string()),
                rooms: vec![IdInput::Number(7), IdInput::Text("8".to_string())],
            },
        };

        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("delay = \"2s 500ms\""));

        let parsed: ParleyConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.endpoint, "https://chat.example.com");
        assert_eq!(parsed.server.transports, vec![TransportKind::WebSocket]);
        assert_eq!(parsed.server.protocol, Protocol::JsonFrames);
        assert_eq!(parsed.reconnect.delay, Duration::from_millis(2500));
        assert_eq!(parsed.chat.user.as_deref(), Some("42"));
        assert_eq!(parsed.chat.rooms.len(), 2);
    }

    #[test]
    fn test_raw_config_partial_parsing() {
        let toml_str = r#"
[server]
endpoint = "http://10.0.0.2:3001/"

[reconnect]
delay = "250ms"
"#;
        let raw: RawParleyConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(raw.server.endpoint.as_deref(), Some("http://10.0.0.2:3001/"));
        assert!(raw.server.transports.is_none());
        assert!(raw.reconnect.enabled.is_none());
        assert_eq!(raw.reconnect.delay, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_server_from_raw_normalizes_endpoint() {
        let server = ServerConfig::from_raw(RawServerConfig {
            endpoint: Some("http://chat.local:3001///".to_string()),
            ..Default::default()
        });
        assert_eq!(server.endpoint, "http://chat.local:3001");
        assert_eq!(server.transports, default_transport_kinds());
    }

    #[test]
    fn test_client_config_carries_every_section() {
        let config = ParleyConfig {
            server: ServerConfig {
                endpoint: "http://chat.local:3001".to_string(),
                api_url: Some("http://chat.local:3000".to_string()),
                protocol: Protocol::JsonFrames,
                transports: vec![TransportKind::WebSocket],
            },
            reconnect: ReconnectConfig::disabled(),
            chat: ChatConfig::default(),
        };

        let client = config.client_config();
        assert_eq!(client.endpoint, "http://chat.local:3001");
        assert_eq!(client.api_url.as_deref(), Some("http://chat.local:3000"));
        assert_eq!(client.transport_kinds, vec![TransportKind::WebSocket]);
        assert_eq!(client.protocol, Protocol::JsonFrames);
        assert!(!client.reconnect.enabled);
    }
}
