//! Chat event types and the listener registry

mod registry;
mod types;

pub use registry::{Listener, ListenerId, ListenerRegistry, Subscription};
pub use types::{
    ChatMessage, DisconnectReason, EventName, InboundEvent, MessageDraft, MessageStatusUpdate,
    OutboundEvent, OutgoingMessage, PresenceUpdate, ReadReceipt, RoomRef, TypingNotice,
    TypingState,
};
