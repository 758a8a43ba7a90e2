//! Typed chat events
//!
//! Every event has a fixed name and a fixed payload shape. On the wire an
//! event travels as an adjacently tagged frame:
//!
//! ```json
//! {"event": "join_chat", "data": {"chatId": 42}}
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::ids::{ChatId, IdInput, MessageId, UserId};

/// Names of every event a listener can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    Connect,
    Disconnect,
    ConnectError,
    ReconnectAttempt,
    ReconnectFailed,
    NewMessage,
    MessageStatusUpdate,
    UserTyping,
    UserStoppedTyping,
    UserOnlineStatus,
}

impl EventName {
    pub const ALL: [EventName; 10] = [
        EventName::Connect,
        EventName::Disconnect,
        EventName::ConnectError,
        EventName::ReconnectAttempt,
        EventName::ReconnectFailed,
        EventName::NewMessage,
        EventName::MessageStatusUpdate,
        EventName::UserTyping,
        EventName::UserStoppedTyping,
        EventName::UserOnlineStatus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Connect => "connect",
            EventName::Disconnect => "disconnect",
            EventName::ConnectError => "connect_error",
            EventName::ReconnectAttempt => "reconnect_attempt",
            EventName::ReconnectFailed => "reconnect_failed",
            EventName::NewMessage => "new_message",
            EventName::MessageStatusUpdate => "message_status_update",
            EventName::UserTyping => "user_typing",
            EventName::UserStoppedTyping => "user_stopped_typing",
            EventName::UserOnlineStatus => "user_online_status",
        }
    }

    /// Lifecycle events are raised by the transport itself, never by the peer.
    pub fn is_lifecycle(self) -> bool {
        matches!(
            self,
            EventName::Connect
                | EventName::Disconnect
                | EventName::ConnectError
                | EventName::ReconnectAttempt
                | EventName::ReconnectFailed
        )
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventName {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownEvent(s.to_string()))
    }
}

/// Why a transport lost its connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    /// The server closed the connection deliberately; no reconnection follows
    #[serde(rename = "io server disconnect")]
    ServerDisconnect,
    /// The client closed the connection
    #[serde(rename = "io client disconnect")]
    ClientDisconnect,
    /// The underlying stream ended
    #[serde(rename = "transport close")]
    TransportClose,
    /// The underlying stream failed
    #[serde(rename = "transport error")]
    TransportError,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ServerDisconnect => "io server disconnect",
            DisconnectReason::ClientDisconnect => "io client disconnect",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
        }
    }

    /// Whether the transport's reconnection policy should kick in
    pub fn allows_reconnect(&self) -> bool {
        matches!(
            self,
            DisconnectReason::TransportClose | DisconnectReason::TransportError
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat message pushed by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    #[serde(alias = "chatId")]
    pub chat_id: ChatId,
    #[serde(default, alias = "senderId", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    /// Message content (text, attachments, timestamps); opaque to the session
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl ChatMessage {
    pub fn text(&self) -> Option<&str> {
        self.content.get("text").and_then(Value::as_str)
    }
}

/// Delivery/read status change for a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStatusUpdate {
    #[serde(alias = "messageId")]
    pub message_id: MessageId,
    pub status: String,
    #[serde(default, alias = "chatId", skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A user started or stopped typing in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    #[serde(alias = "chat_id")]
    pub chat_id: ChatId,
    #[serde(alias = "user_id")]
    pub user_id: UserId,
}

/// A user's online status changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    #[serde(alias = "user_id")]
    pub user_id: UserId,
    #[serde(alias = "is_online", alias = "online")]
    pub is_online: bool,
    #[serde(default, alias = "last_seen", skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

/// Events delivered to listeners
///
/// Lifecycle variants are raised locally by the transport. The rest are
/// decoded from frames pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    Connect,
    Disconnect { reason: DisconnectReason },
    ConnectError { message: String },
    ReconnectAttempt { attempt: u32 },
    ReconnectFailed,
    NewMessage(ChatMessage),
    MessageStatusUpdate(MessageStatusUpdate),
    UserTyping(TypingNotice),
    UserStoppedTyping(TypingNotice),
    UserOnlineStatus(PresenceUpdate),
}

impl InboundEvent {
    pub fn name(&self) -> EventName {
        match self {
            InboundEvent::Connect => EventName::Connect,
            InboundEvent::Disconnect { .. } => EventName::Disconnect,
            InboundEvent::ConnectError { .. } => EventName::ConnectError,
            InboundEvent::ReconnectAttempt { .. } => EventName::ReconnectAttempt,
            InboundEvent::ReconnectFailed => EventName::ReconnectFailed,
            InboundEvent::NewMessage(_) => EventName::NewMessage,
            InboundEvent::MessageStatusUpdate(_) => EventName::MessageStatusUpdate,
            InboundEvent::UserTyping(_) => EventName::UserTyping,
            InboundEvent::UserStoppedTyping(_) => EventName::UserStoppedTyping,
            InboundEvent::UserOnlineStatus(_) => EventName::UserOnlineStatus,
        }
    }

    /// Decode a frame received from the server.
    ///
    /// Unknown names and lifecycle names are rejected before the payload is
    /// looked at, so a peer can never forge a `connect` or `disconnect`.
    pub fn decode_frame(text: &str) -> Result<Self, ProtocolError> {
        #[derive(Deserialize)]
        struct Envelope {
            event: String,
            #[serde(default)]
            data: Value,
        }

        let envelope: Envelope = serde_json::from_str(text)?;
        Self::from_parts(&envelope.event, envelope.data)
    }

    /// Decode an event delivered as a name plus a JSON payload.
    pub fn from_parts(name: &str, data: Value) -> Result<Self, ProtocolError> {
        let event: EventName = name.parse()?;
        if event.is_lifecycle() {
            return Err(ProtocolError::LocalOnly(name.to_string()));
        }
        let mut frame = Map::new();
        frame.insert("event".to_string(), Value::String(name.to_string()));
        frame.insert("data".to_string(), data);
        Ok(serde_json::from_value(Value::Object(frame))?)
    }
}

/// `{chatId}` payload of `join_chat` / `leave_chat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub chat_id: ChatId,
}

/// `{chatId, userId}` payload of `typing` / `stopped_typing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingState {
    pub chat_id: ChatId,
    pub user_id: UserId,
}

/// `{messageId, userId}` payload of `mark_read`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub user_id: UserId,
}

/// A message as handed to the session by a caller, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub chat_id: IdInput,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl MessageDraft {
    pub fn new(chat_id: impl Into<IdInput>) -> Self {
        Self {
            chat_id: chat_id.into(),
            content: Map::new(),
        }
    }

    /// Build a draft from a JSON object that carries a `chat_id` field.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_value(value)?)
    }

    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.field("text", Value::String(text.into()))
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    /// Coerce the room id to an integer, keeping every other field as is.
    pub fn normalize(self) -> Result<OutgoingMessage, ProtocolError> {
        Ok(OutgoingMessage {
            chat_id: ChatId::try_from(self.chat_id)?,
            content: self.content,
        })
    }
}

/// `send_message` payload: caller content plus a normalized `chat_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub chat_id: ChatId,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

/// Events emitted to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    JoinChat(RoomRef),
    LeaveChat(RoomRef),
    SendMessage(OutgoingMessage),
    Typing(TypingState),
    StoppedTyping(TypingState),
    MarkRead(ReadReceipt),
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::JoinChat(_) => "join_chat",
            OutboundEvent::LeaveChat(_) => "leave_chat",
            OutboundEvent::SendMessage(_) => "send_message",
            OutboundEvent::Typing(_) => "typing",
            OutboundEvent::StoppedTyping(_) => "stopped_typing",
            OutboundEvent::MarkRead(_) => "mark_read",
        }
    }

    /// The `data` part of the frame, as sent on the wire
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        let mut frame = serde_json::to_value(self)?;
        Ok(frame
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    pub fn encode_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
