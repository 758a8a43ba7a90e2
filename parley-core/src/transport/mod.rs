//! Transport abstraction
//!
//! A transport is one bidirectional named-event channel to the chat backend.
//! It owns the listener registry, runs its own reconnection policy and raises
//! the lifecycle events (`connect`, `disconnect`, `connect_error`,
//! `reconnect_attempt`, `reconnect_failed`) that drive session state.
//!
//! Construction and opening are separate steps: the session registers its
//! lifecycle observers between [`TransportFactory::create`] and
//! [`Transport::open`], so no lifecycle event can be missed.
//!
//! [`SocketIoTransport`] speaks Socket.IO and is the default.
//! [`WebSocketTransport`] carries plain JSON frames for backends without a
//! Socket.IO layer.

mod mock;
mod socketio;
mod websocket;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::TransportKind;
use crate::credentials::AccessToken;
use crate::error::TransportError;
use crate::events::{ListenerRegistry, OutboundEvent};
use crate::ids::UserId;
use crate::reconnect::ReconnectConfig;

pub use mock::{MockTransport, MockTransportFactory};
pub use socketio::{
    CONNECT_TIMEOUT, SocketIoTransport, SocketIoTransportFactory, handshake_auth, socketio_url,
};
pub use websocket::{WebSocketTransport, WebSocketTransportFactory};

/// Unique identity of one constructed transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransportId(Uuid);

impl TransportId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity and credential presented when the connection is established
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPayload {
    pub token: Option<AccessToken>,
    pub user_id: UserId,
}

/// Everything a transport is built from
#[derive(Debug, Clone, PartialEq)]
pub struct TransportOptions {
    /// Backend endpoint without trailing slashes
    pub endpoint: String,
    pub auth: AuthPayload,
    /// Kinds to try, in order
    pub transport_kinds: Vec<TransportKind>,
    pub reconnection: ReconnectConfig,
}

/// One bidirectional event channel
pub trait Transport: Send + Sync {
    fn id(&self) -> TransportId;

    fn options(&self) -> &TransportOptions;

    /// Registry inbound and lifecycle events are dispatched to
    fn listeners(&self) -> &ListenerRegistry;

    /// Start connecting. Returns immediately; the outcome arrives as a
    /// `connect` or `connect_error` event.
    fn open(&self) -> Result<(), TransportError>;

    /// Send one event to the backend without waiting for acknowledgement.
    fn emit(&self, event: &OutboundEvent) -> Result<(), TransportError>;

    /// Whether the underlying connection is live right now
    fn is_connected(&self) -> bool;

    /// Close the connection, cancel pending reconnection and drop every
    /// listener. Idempotent.
    fn close(&self);
}

/// Builds transports for a session
pub trait TransportFactory: Send + Sync {
    fn create(&self, options: TransportOptions) -> Result<Arc<dyn Transport>, TransportError>;
}
