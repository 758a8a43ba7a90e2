//! Error types for parley-core

use thiserror::Error;

use crate::config::TransportKind;

/// Errors returned by [`Session`](crate::Session) operations
///
/// Connection failures are never reported here; they arrive asynchronously
/// as lifecycle events and drive the connection state instead.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("User id must not be empty")]
    EmptyUserId,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised by a [`Transport`](crate::transport::Transport)
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Transport kind {0} is not supported by this transport")]
    UnsupportedKind(TransportKind),

    #[error("No transport kinds configured")]
    NoTransportKinds,

    #[error("No tokio runtime available to drive the transport")]
    NoRuntime,

    #[error("Transport was already opened")]
    AlreadyOpened,

    #[error("Transport is closed")]
    Closed,

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors reading or writing persisted credentials
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential file is malformed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize credentials: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Errors at the protocol boundary (identifiers and frame payloads)
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid numeric id: {value:?}")]
    InvalidId { value: String },

    #[error("Unknown event name: {0}")]
    UnknownEvent(String),

    #[error("Event {0} is local to the client and cannot travel over the wire")]
    LocalOnly(String),

    #[error("Failed to decode frame: {0}")]
    Decode(#[from] serde_json::Error),
}
