//! parley-core: Realtime chat session manager
//!
//! This crate provides the client side of a realtime chat connection:
//!
//! - **Session management** - [`Session`] binds one user to one transport and
//!   gates outbound operations on [`ConnectionState`]
//! - **Event types** - [`InboundEvent`] and [`OutboundEvent`] for the named
//!   events exchanged with the backend
//! - **Transports** - the [`Transport`](transport::Transport) seam, with
//!   Socket.IO and plain WebSocket implementations and a scriptable mock
//! - **Credentials** - [`CredentialSource`](credentials::CredentialSource) for
//!   the access token presented on connect
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use parley_core::{ClientConfig, MessageDraft, Session};
//! use parley_core::credentials::FileCredentialStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::from_config(
//!     ClientConfig::from_env(),
//!     Arc::new(FileCredentialStore::default_location()),
//! );
//!
//! session.connect_with("42", |session| {
//!     session.on_connect(|| println!("connected"));
//!     session.on_new_message(|message| println!("{:?}", message.text()));
//! })?;
//!
//! // Later, once connected
//! session.join_room(7);
//! session.send_message(MessageDraft::new(7).text("hello"));
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                   Session                     │
//! │   state: Disconnected/Connecting/Connected    │
//! │  ┌────────────────────────────────────────┐   │
//! │  │          Transport (one at a time)     │   │
//! │  │  ┌──────────────────┐  ┌────────────┐  │   │
//! │  │  │ ListenerRegistry │  │ reconnect  │  │   │
//! │  │  └──────────────────┘  └────────────┘  │   │
//! │  └────────────────────────────────────────┘   │
//! └──────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod ids;
pub mod reconnect;
pub mod session;
pub mod transport;

// Re-export key types for convenience
pub use config::{ClientConfig, Protocol, TransportKind};
pub use credentials::{AccessToken, CredentialSource, FileCredentialStore, StaticCredentials};
pub use error::{CredentialError, ProtocolError, SessionError, TransportError};
pub use events::{
    ChatMessage, DisconnectReason, EventName, InboundEvent, ListenerId, MessageDraft,
    MessageStatusUpdate, OutboundEvent, PresenceUpdate, Subscription, TypingNotice,
};
pub use ids::{ChatId, IdInput, MessageId, UserId};
pub use reconnect::ReconnectConfig;
pub use session::{ConnectionHandle, ConnectionState, Delivery, DropReason, Session};
