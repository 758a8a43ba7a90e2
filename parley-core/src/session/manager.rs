//! The session manager
//!
//! A [`Session`] owns at most one transport at a time, binds it to one user
//! identity, and gates every outbound operation on the connection state
//! reported by that transport's lifecycle events.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use super::state::{ConnectionState, Delivery, DropReason};
use crate::config::{ClientConfig, Protocol, normalize_endpoint};
use crate::credentials::CredentialSource;
use crate::error::SessionError;
use crate::events::{
    ChatMessage, DisconnectReason, EventName, InboundEvent, ListenerId, MessageDraft,
    MessageStatusUpdate, OutboundEvent, PresenceUpdate, ReadReceipt, RoomRef, Subscription,
    TypingNotice, TypingState,
};
use crate::ids::{ChatId, IdInput, MessageId, UserId};
use crate::transport::{
    AuthPayload, SocketIoTransportFactory, Transport, TransportFactory, TransportId,
    TransportOptions, WebSocketTransportFactory,
};

/// Read-only view of the transport a session is bound to
///
/// Handles compare equal when they refer to the same transport. A handle
/// cannot close the transport; only the owning session can.
#[derive(Clone)]
pub struct ConnectionHandle {
    transport: Arc<dyn Transport>,
    user_id: UserId,
}

impl ConnectionHandle {
    pub fn id(&self) -> TransportId {
        self.transport.id()
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn endpoint(&self) -> &str {
        &self.transport.options().endpoint
    }

    /// Whether the transport currently has a live connection
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id())
            .field("user_id", &self.user_id)
            .finish()
    }
}

struct Binding {
    transport: Arc<dyn Transport>,
    user_id: UserId,
    generation: u64,
}

impl Binding {
    fn handle(&self) -> ConnectionHandle {
        ConnectionHandle {
            transport: Arc::clone(&self.transport),
            user_id: self.user_id.clone(),
        }
    }
}

struct Inner {
    binding: Option<Binding>,
    state: ConnectionState,
    next_generation: u64,
    state_tx: watch::Sender<ConnectionState>,
}

impl Inner {
    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            trace!(from = %self.state, to = %state, "Connection state changed");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    /// Detach the current binding and reset to Disconnected.
    ///
    /// The caller closes the returned transport after releasing the lock.
    fn take_binding(&mut self) -> Option<Binding> {
        let binding = self.binding.take();
        self.set_state(ConnectionState::Disconnected);
        binding
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Realtime chat session over a single transport
///
/// Construct one per application and share it by reference or `Arc`.
/// Every operation is synchronous and non-blocking; connection outcomes
/// arrive later through lifecycle events.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use parley_core::{ClientConfig, Session};
/// use parley_core::credentials::FileCredentialStore;
///
/// # async fn example() -> Result<(), parley_core::SessionError> {
/// let session = Session::from_config(
///     ClientConfig::from_env(),
///     Arc::new(FileCredentialStore::default_location()),
/// );
/// session.connect_with("u1", |session| {
///     session.on_new_message(|message| println!("{:?}", message.text()));
/// })?;
/// # Ok(())
/// # }
/// ```
pub struct Session {
    config: ClientConfig,
    credentials: Arc<dyn CredentialSource>,
    factory: Arc<dyn TransportFactory>,
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("Session")
            .field("endpoint", &self.config.endpoint)
            .field("state", &inner.state)
            .field("user_id", &inner.binding.as_ref().map(|b| &b.user_id))
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(
        config: ClientConfig,
        credentials: Arc<dyn CredentialSource>,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            credentials,
            factory,
            inner: Arc::new(Mutex::new(Inner {
                binding: None,
                state: ConnectionState::Disconnected,
                next_generation: 0,
                state_tx,
            })),
        }
    }

    /// Session whose transports speak `config.protocol`
    pub fn from_config(config: ClientConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        match config.protocol {
            Protocol::SocketIo => Self::socket_io(config, credentials),
            Protocol::JsonFrames => Self::websocket(config, credentials),
        }
    }

    /// Session backed by [`SocketIoTransport`](crate::transport::SocketIoTransport)s
    pub fn socket_io(config: ClientConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::new(config, credentials, Arc::new(SocketIoTransportFactory))
    }

    /// Session backed by [`WebSocketTransport`](crate::transport::WebSocketTransport)s
    pub fn websocket(config: ClientConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::new(config, credentials, Arc::new(WebSocketTransportFactory))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // === Lifecycle ===

    /// Bind the session to `user_id` and start connecting.
    ///
    /// Returns the existing handle when already connected as `user_id`.
    /// Any other bound transport is torn down first, so at most one
    /// transport is ever live. The returned handle is valid immediately;
    /// the connection itself completes asynchronously.
    ///
    /// On a multi-threaded runtime `connect` may fire before this returns.
    /// Register listeners that must see it through
    /// [`connect_with`](Session::connect_with).
    pub fn connect(&self, user_id: impl Into<UserId>) -> Result<ConnectionHandle, SessionError> {
        self.connect_with(user_id, |_| {})
    }

    /// Like [`connect`](Session::connect), but runs `setup` after the new
    /// transport is bound and before it is opened.
    ///
    /// Listeners registered inside `setup` are guaranteed to observe the
    /// first `connect` event. `setup` does not run when the existing
    /// connection is reused.
    pub fn connect_with<F>(
        &self,
        user_id: impl Into<UserId>,
        setup: F,
    ) -> Result<ConnectionHandle, SessionError>
    where
        F: FnOnce(&Session),
    {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(SessionError::EmptyUserId);
        }

        let stale = {
            let mut inner = lock(&self.inner);
            if let Some(binding) = &inner.binding {
                if binding.user_id == user_id && inner.state == ConnectionState::Connected {
                    debug!(user_id = %user_id, "Using existing connection");
                    return Ok(binding.handle());
                }
                if binding.user_id != user_id {
                    info!(from = %binding.user_id, to = %user_id, "Switching user, reconnecting");
                } else {
                    debug!(user_id = %user_id, state = %inner.state, "Replacing transport that is not connected");
                }
            }
            inner.take_binding()
        };
        if let Some(stale) = stale {
            stale.transport.close();
        }

        let token = match self.credentials.access_token() {
            Ok(token) => {
                if token.is_none() {
                    debug!(user_id = %user_id, "No access token, connecting anonymously");
                }
                token
            }
            Err(e) => {
                warn!(error = %e, "Failed to read access token, connecting without one");
                None
            }
        };

        let options = TransportOptions {
            endpoint: normalize_endpoint(&self.config.endpoint),
            auth: AuthPayload {
                token,
                user_id: user_id.clone(),
            },
            transport_kinds: self.config.transport_kinds.clone(),
            reconnection: self.config.reconnect.clone(),
        };
        let transport = self.factory.create(options)?;

        let (handle, displaced) = {
            let mut inner = lock(&self.inner);
            // Another connect may have bound a transport since the lock was released.
            let displaced = inner.take_binding();
            inner.next_generation += 1;
            let generation = inner.next_generation;
            observe_lifecycle(&self.inner, transport.as_ref(), generation);

            let binding = Binding {
                transport: Arc::clone(&transport),
                user_id,
                generation,
            };
            let handle = binding.handle();
            inner.binding = Some(binding);
            inner.set_state(ConnectionState::Connecting);
            (handle, displaced)
        };
        if let Some(displaced) = displaced {
            warn!(user_id = %displaced.user_id, "Concurrent connect replaced a transport");
            displaced.transport.close();
        }

        setup(self);

        if let Err(e) = transport.open() {
            let rolled_back = {
                let mut inner = lock(&self.inner);
                let ours = inner
                    .binding
                    .as_ref()
                    .is_some_and(|b| b.transport.id() == transport.id());
                if ours { inner.take_binding() } else { None }
            };
            drop(rolled_back);
            transport.close();
            error!(error = %e, "Failed to open transport");
            return Err(e.into());
        }

        info!(
            user_id = %handle.user_id(),
            transport_id = %handle.id(),
            endpoint = %handle.endpoint(),
            "Connecting"
        );
        Ok(handle)
    }

    /// Close the transport and forget the bound identity. Idempotent.
    pub fn disconnect(&self) {
        let binding = lock(&self.inner).take_binding();
        match binding {
            Some(binding) => {
                binding.transport.close();
                info!(user_id = %binding.user_id, "Socket disconnected and cleaned up");
            }
            None => debug!("Disconnect requested with no transport bound"),
        }
    }

    // === Rooms and messaging ===

    /// Ask the server to add this connection to a room.
    pub fn join_room(&self, room: impl Into<IdInput>) -> Delivery {
        let room = room.into();
        let Some(transport) = self.connected_transport() else {
            warn!(room = %room, "Cannot join chat - socket not connected");
            return Delivery::Dropped(DropReason::NotConnected);
        };
        let chat_id = match ChatId::try_from(room) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Cannot join chat - invalid room id");
                return Delivery::Dropped(DropReason::InvalidId);
            }
        };

        let delivery = emit(transport.as_ref(), OutboundEvent::JoinChat(RoomRef { chat_id }));
        if delivery.is_emitted() {
            info!(%chat_id, "Joined chat room");
        }
        delivery
    }

    /// Ask the server to remove this connection from a room.
    pub fn leave_room(&self, room: impl Into<IdInput>) -> Delivery {
        let room = room.into();
        let Some(transport) = self.connected_transport() else {
            debug!(room = %room, "Not connected, skipping leave");
            return Delivery::Dropped(DropReason::NotConnected);
        };
        let chat_id = match ChatId::try_from(room) {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Cannot leave chat - invalid room id");
                return Delivery::Dropped(DropReason::InvalidId);
            }
        };

        let delivery = emit(transport.as_ref(), OutboundEvent::LeaveChat(RoomRef { chat_id }));
        if delivery.is_emitted() {
            info!(%chat_id, "Left chat room");
        }
        delivery
    }

    /// Send a chat message. Dropped, and logged as an error, when not connected.
    pub fn send_message(&self, draft: MessageDraft) -> Delivery {
        let Some(transport) = self.connected_transport() else {
            error!(room = %draft.chat_id, "Cannot send message - socket not connected");
            return Delivery::Dropped(DropReason::NotConnected);
        };
        let message = match draft.normalize() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Cannot send message - invalid room id");
                return Delivery::Dropped(DropReason::InvalidId);
            }
        };

        debug!(chat_id = %message.chat_id, "Sending message via socket");
        emit(transport.as_ref(), OutboundEvent::SendMessage(message))
    }

    /// Emit `typing` or `stopped_typing`. Best-effort; silently dropped when
    /// not connected.
    pub fn send_typing_state(
        &self,
        room: impl Into<IdInput>,
        user_id: impl Into<UserId>,
        is_typing: bool,
    ) -> Delivery {
        let Some(transport) = self.connected_transport() else {
            trace!("Not connected, dropping typing indicator");
            return Delivery::Dropped(DropReason::NotConnected);
        };
        let Ok(chat_id) = ChatId::try_from(room.into()) else {
            debug!("Invalid room id, dropping typing indicator");
            return Delivery::Dropped(DropReason::InvalidId);
        };

        let state = TypingState {
            chat_id,
            user_id: user_id.into(),
        };
        let event = if is_typing {
            OutboundEvent::Typing(state)
        } else {
            OutboundEvent::StoppedTyping(state)
        };
        emit(transport.as_ref(), event)
    }

    /// Emit a read receipt. Best-effort; silently dropped when not connected.
    pub fn mark_read(&self, message_id: impl Into<IdInput>, user_id: impl Into<UserId>) -> Delivery {
        let Some(transport) = self.connected_transport() else {
            trace!("Not connected, dropping read receipt");
            return Delivery::Dropped(DropReason::NotConnected);
        };
        let Ok(message_id) = MessageId::try_from(message_id.into()) else {
            debug!("Invalid message id, dropping read receipt");
            return Delivery::Dropped(DropReason::InvalidId);
        };

        emit(
            transport.as_ref(),
            OutboundEvent::MarkRead(ReadReceipt {
                message_id,
                user_id: user_id.into(),
            }),
        )
    }

    // === Listeners ===

    /// Register a raw listener on the bound transport.
    ///
    /// Returns `None` when no transport is bound. Registrations belong to the
    /// transport: they survive reconnects but not an identity switch or
    /// [`disconnect`](Session::disconnect). Inside
    /// [`connect_with`](Session::connect_with) the new transport is already
    /// bound.
    pub fn on<F>(&self, name: EventName, listener: F) -> Option<Subscription>
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let Some(transport) = self.current_transport() else {
            debug!(event = %name, "No transport bound, listener not registered");
            return None;
        };
        Some(transport.listeners().on(name, listener))
    }

    pub fn on_new_message<F>(&self, listener: F) -> Option<Subscription>
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.on(EventName::NewMessage, move |event| {
            if let InboundEvent::NewMessage(message) = event {
                listener(message);
            }
        })
    }

    pub fn on_message_status_update<F>(&self, listener: F) -> Option<Subscription>
    where
        F: Fn(&MessageStatusUpdate) + Send + Sync + 'static,
    {
        self.on(EventName::MessageStatusUpdate, move |event| {
            if let InboundEvent::MessageStatusUpdate(update) = event {
                listener(update);
            }
        })
    }

    pub fn on_user_typing<F>(&self, listener: F) -> Option<Subscription>
    where
        F: Fn(&TypingNotice) + Send + Sync + 'static,
    {
        self.on(EventName::UserTyping, move |event| {
            if let InboundEvent::UserTyping(notice) = event {
                listener(notice);
            }
        })
    }

    pub fn on_user_stopped_typing<F>(&self, listener: F) -> Option<Subscription>
    where
        F: Fn(&TypingNotice) + Send + Sync + 'static,
    {
        self.on(EventName::UserStoppedTyping, move |event| {
            if let InboundEvent::UserStoppedTyping(notice) = event {
                listener(notice);
            }
        })
    }

    pub fn on_user_online_status<F>(&self, listener: F) -> Option<Subscription>
    where
        F: Fn(&PresenceUpdate) + Send + Sync + 'static,
    {
        self.on(EventName::UserOnlineStatus, move |event| {
            if let InboundEvent::UserOnlineStatus(update) = event {
                listener(update);
            }
        })
    }

    /// Runs after the session has marked itself Connected.
    pub fn on_connect<F>(&self, listener: F) -> Option<Subscription>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on(EventName::Connect, move |_| listener())
    }

    pub fn on_disconnect<F>(&self, listener: F) -> Option<Subscription>
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.on(EventName::Disconnect, move |event| {
            if let InboundEvent::Disconnect { reason } = event {
                listener(reason);
            }
        })
    }

    pub fn on_connect_error<F>(&self, listener: F) -> Option<Subscription>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on(EventName::ConnectError, move |event| {
            if let InboundEvent::ConnectError { message } = event {
                listener(message);
            }
        })
    }

    /// Remove one registration. Returns whether it was present.
    pub fn off(&self, name: EventName, id: ListenerId) -> bool {
        self.current_transport()
            .is_some_and(|t| t.listeners().off(name, id))
    }

    /// Remove every listener for `name`, including the session's own
    /// lifecycle observers when `name` is a lifecycle event.
    pub fn remove_all_listeners(&self, name: EventName) -> usize {
        self.current_transport()
            .map_or(0, |t| t.listeners().remove_all_listeners(name))
    }

    // === Introspection ===

    pub fn state(&self) -> ConnectionState {
        lock(&self.inner).state
    }

    pub fn bound_user(&self) -> Option<UserId> {
        lock(&self.inner)
            .binding
            .as_ref()
            .map(|b| b.user_id.clone())
    }

    pub fn transport_handle(&self) -> Option<ConnectionHandle> {
        lock(&self.inner).binding.as_ref().map(Binding::handle)
    }

    /// Connected as far as both the session and the transport can tell
    pub fn is_connected(&self) -> bool {
        let inner = lock(&self.inner);
        inner.state == ConnectionState::Connected
            && inner
                .binding
                .as_ref()
                .is_some_and(|b| b.transport.is_connected())
    }

    /// Watch connection state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        lock(&self.inner).state_tx.subscribe()
    }

    fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        lock(&self.inner)
            .binding
            .as_ref()
            .map(|b| Arc::clone(&b.transport))
    }

    fn connected_transport(&self) -> Option<Arc<dyn Transport>> {
        let inner = lock(&self.inner);
        match (&inner.binding, inner.state) {
            (Some(binding), ConnectionState::Connected) => Some(Arc::clone(&binding.transport)),
            _ => None,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(binding) = lock(&self.inner).binding.take() {
            binding.transport.close();
        }
    }
}

fn emit(transport: &dyn Transport, event: OutboundEvent) -> Delivery {
    match transport.emit(&event) {
        Ok(()) => Delivery::Emitted,
        Err(e) => {
            warn!(event = event.name(), error = %e, "Transport rejected event");
            Delivery::Dropped(DropReason::TransportRejected)
        }
    }
}

/// Register the observers that translate lifecycle events into session
/// state. They hold the session weakly and act only while `generation` is
/// still the bound one.
fn observe_lifecycle(inner: &Arc<Mutex<Inner>>, transport: &dyn Transport, generation: u64) {
    for name in EventName::ALL.into_iter().filter(|n| n.is_lifecycle()) {
        let inner: Weak<Mutex<Inner>> = Arc::downgrade(inner);
        transport.listeners().on(name, move |event| {
            if let Some(inner) = inner.upgrade() {
                apply_lifecycle(&inner, generation, event);
            }
        });
    }
}

fn apply_lifecycle(inner: &Mutex<Inner>, generation: u64, event: &InboundEvent) {
    let mut inner = lock(inner);
    let Some(binding) = inner
        .binding
        .as_ref()
        .filter(|b| b.generation == generation)
    else {
        debug!(event = %event.name(), "Ignoring lifecycle event from a stale transport");
        return;
    };
    let user_id = binding.user_id.clone();
    let transport_id = binding.transport.id();

    match event {
        InboundEvent::Connect => {
            info!(%user_id, %transport_id, "Socket connected");
            inner.set_state(ConnectionState::Connected);
        }
        InboundEvent::Disconnect { reason } => {
            info!(%user_id, %reason, "Socket disconnected");
            inner.set_state(ConnectionState::Disconnected);
        }
        InboundEvent::ConnectError { message } => {
            warn!(%user_id, error = %message, "Socket connection error");
            inner.set_state(ConnectionState::Disconnected);
        }
        InboundEvent::ReconnectAttempt { attempt } => {
            debug!(%user_id, attempt, "Reconnecting");
            inner.set_state(ConnectionState::Connecting);
        }
        InboundEvent::ReconnectFailed => {
            error!(%user_id, "Reconnection attempts exhausted, call connect() to retry");
            inner.set_state(ConnectionState::Disconnected);
        }
        _ => {}
    }
}
