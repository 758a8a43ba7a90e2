//! Connection state and operation outcomes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Connection state of a session
///
/// ```text
/// Disconnected ──connect()──► Connecting ──"connect"──► Connected
///      ▲  ▲                        ▲                        │
///      │  └──"reconnect_attempt"───┘   "disconnect" /       │
///      │                               "connect_error"      │
///      └────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// Why an outbound operation did not reach the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The session was not connected
    NotConnected,
    /// An identifier could not be normalized to an integer
    InvalidId,
    /// The transport refused the event
    TransportRejected,
}

/// Outcome of an outbound operation
///
/// Nothing is queued or retried; a dropped event is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Emitted,
    Dropped(DropReason),
}

impl Delivery {
    pub fn is_emitted(self) -> bool {
        matches!(self, Delivery::Emitted)
    }
}
