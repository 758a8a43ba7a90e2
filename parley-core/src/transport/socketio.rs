//! Socket.IO transport
//!
//! Speaks Socket.IO through `rust_socketio`. The bound user id and access
//! token travel in the handshake `auth` payload. Every connection attempt
//! walks the configured transport kinds in order, so `polling` takes over
//! when the websocket upgrade is refused.
//!
//! `rust_socketio`'s own reconnection is switched off; the driver applies
//! [`ReconnectBudget`] so `reconnect_attempt` and `reconnect_failed` are
//! raised here exactly as for every other transport.
//!
//! ```text
//!  emit() ──► mpsc ──► driver ──► Client::emit ──► server
//!                        │
//!  listeners ◄─ dispatch ◄─ signals ◄─ callbacks ◄─ server
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::{Event, Payload, TransportType};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{AuthPayload, Transport, TransportFactory, TransportId, TransportOptions};
use crate::config::TransportKind;
use crate::error::TransportError;
use crate::events::{DisconnectReason, InboundEvent, ListenerRegistry, OutboundEvent};
use crate::reconnect::ReconnectBudget;

/// How long the server gets to accept the namespace connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Map an endpoint to the `http(s)` URL `rust_socketio` dials.
pub fn socketio_url(endpoint: &str) -> Result<String, TransportError> {
    let invalid = |reason: String| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "http",
        "https" | "wss" => "https",
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch to {scheme}")))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Handshake `auth` object: `{"token": …, "userId": …}`
///
/// `token` is `null` for anonymous connections. `userId` keeps the JSON type
/// the id was created with.
pub fn handshake_auth(auth: &AuthPayload) -> Value {
    json!({
        "token": auth.token.as_ref().map(|t| t.expose_secret()),
        "userId": auth.user_id,
    })
}

fn transport_type(kind: TransportKind) -> TransportType {
    match kind {
        TransportKind::WebSocket => TransportType::Websocket,
        TransportKind::Polling => TransportType::Polling,
    }
}

/// First argument of an event, which is what a listener receives
fn first_argument(payload: Payload) -> Option<Value> {
    match payload {
        Payload::Text(values) => Some(values.into_iter().next().unwrap_or(Value::Null)),
        _ => None,
    }
}

/// What the `rust_socketio` callbacks hand to the driver
#[derive(Debug)]
enum Signal {
    Connected,
    Closed,
    Failed(String),
    Inbound(InboundEvent),
}

/// [`Transport`] over a Socket.IO connection
pub struct SocketIoTransport {
    id: TransportId,
    url: String,
    options: TransportOptions,
    listeners: ListenerRegistry,
    connected: Arc<AtomicBool>,
    outgoing_tx: mpsc::UnboundedSender<(&'static str, Value)>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<(&'static str, Value)>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for SocketIoTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoTransport")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("kinds", &self.options.transport_kinds)
            .finish_non_exhaustive()
    }
}

impl SocketIoTransport {
    pub fn new(options: TransportOptions) -> Result<Self, TransportError> {
        if options.transport_kinds.is_empty() {
            return Err(TransportError::NoTransportKinds);
        }
        let url = socketio_url(&options.endpoint)?;
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        Ok(Self {
            id: TransportId::new(),
            url,
            options,
            listeners: ListenerRegistry::new(),
            connected: Arc::new(AtomicBool::new(false)),
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for SocketIoTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn options(&self) -> &TransportOptions {
        &self.options
    }

    fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    fn open(&self) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let outgoing = self
            .outgoing_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(TransportError::AlreadyOpened)?;

        let driver = Driver {
            transport_id: self.id,
            url: self.url.clone(),
            options: self.options.clone(),
            listeners: self.listeners.clone(),
            connected: Arc::clone(&self.connected),
            outgoing,
            shutdown: self.shutdown.clone(),
        };
        runtime.spawn(driver.run());
        debug!(transport_id = %self.id, url = %self.url, "Transport opened");
        Ok(())
    }

    fn emit(&self, event: &OutboundEvent) -> Result<(), TransportError> {
        if self.shutdown.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let payload = event.payload()?;
        debug!(transport_id = %self.id, event = event.name(), "Sending: {}", payload);
        self.outgoing_tx
            .send((event.name(), payload))
            .map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.connected.store(false, Ordering::SeqCst);
        self.listeners.clear();
        debug!(transport_id = %self.id, "Transport closed");
    }
}

impl Drop for SocketIoTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Builds [`SocketIoTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketIoTransportFactory;

impl TransportFactory for SocketIoTransportFactory {
    fn create(&self, options: TransportOptions) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(Arc::new(SocketIoTransport::new(options)?) as Arc<dyn Transport>)
    }
}

/// Background task owning the Socket.IO client for one transport
struct Driver {
    transport_id: TransportId,
    url: String,
    options: TransportOptions,
    listeners: ListenerRegistry,
    connected: Arc<AtomicBool>,
    outgoing: mpsc::UnboundedReceiver<(&'static str, Value)>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let mut budget = ReconnectBudget::new(self.options.reconnection.clone());

        loop {
            let established = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                result = self.establish() => result,
            };

            match established {
                Ok((client, mut signals)) => {
                    budget.reset();
                    self.connected.store(true, Ordering::SeqCst);
                    info!(transport_id = %self.transport_id, url = %self.url, "Connected");
                    self.dispatch(&InboundEvent::Connect);

                    let ended = self.pump(&client, &mut signals).await;
                    self.connected.store(false, Ordering::SeqCst);
                    if let Err(e) = client.disconnect().await {
                        debug!(transport_id = %self.transport_id, error = %e, "Socket.IO disconnect failed");
                    }
                    let Some(reason) = ended else {
                        return;
                    };
                    info!(transport_id = %self.transport_id, %reason, "Disconnected");
                    self.dispatch(&InboundEvent::Disconnect {
                        reason: reason.clone(),
                    });
                    if !reason.allows_reconnect() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(transport_id = %self.transport_id, error = %e, "Connection attempt failed");
                    self.dispatch(&InboundEvent::ConnectError {
                        message: e.to_string(),
                    });
                }
            }

            let Some((attempt, delay)) = budget.next_attempt() else {
                if self.options.reconnection.enabled {
                    error!(
                        transport_id = %self.transport_id,
                        attempts = budget.attempts(),
                        "Reconnection attempts exhausted"
                    );
                    self.dispatch(&InboundEvent::ReconnectFailed);
                }
                return;
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            debug!(transport_id = %self.transport_id, attempt, "Reconnecting");
            self.dispatch(&InboundEvent::ReconnectAttempt { attempt });
        }
    }

    /// Listeners stop being called as soon as the transport is closed.
    fn dispatch(&self, event: &InboundEvent) {
        self.listeners
            .dispatch_while(event, || !self.shutdown.is_cancelled());
    }

    /// Try each configured transport kind in order.
    async fn establish(
        &self,
    ) -> Result<(Client, mpsc::UnboundedReceiver<Signal>), TransportError> {
        let mut last_error = TransportError::NoTransportKinds;

        for kind in &self.options.transport_kinds {
            match self.connect_kind(*kind).await {
                Ok(connected) => return Ok(connected),
                Err(e) => {
                    debug!(transport_id = %self.transport_id, %kind, error = %e, "Socket.IO connect failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn connect_kind(
        &self,
        kind: TransportKind,
    ) -> Result<(Client, mpsc::UnboundedReceiver<Signal>), TransportError> {
        let (signals_tx, mut signals) = mpsc::unbounded_channel();
        let client = self
            .builder(kind, signals_tx)
            .connect()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        // The engine.io session is up; wait for the namespace to accept us.
        let accepted = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match signals.recv().await {
                    Some(Signal::Connected) => return Ok(()),
                    Some(Signal::Failed(message)) => return Err(TransportError::Connect(message)),
                    Some(Signal::Closed) | None => {
                        return Err(TransportError::Connect(
                            "connection closed during handshake".to_string(),
                        ));
                    }
                    Some(Signal::Inbound(_)) => {}
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::Connect(format!(
                "no handshake response within {CONNECT_TIMEOUT:?}"
            )))
        });

        match accepted {
            Ok(()) => Ok((client, signals)),
            Err(e) => {
                let _ = client.disconnect().await;
                Err(e)
            }
        }
    }

    fn builder(&self, kind: TransportKind, signals: mpsc::UnboundedSender<Signal>) -> ClientBuilder {
        let on_connect = signals.clone();
        let on_close = signals.clone();
        let on_error = signals.clone();
        let transport_id = self.transport_id;

        ClientBuilder::new(self.url.clone())
            .transport_type(transport_type(kind))
            .auth(handshake_auth(&self.options.auth))
            .reconnect(false)
            .on(Event::Connect, move |_: Payload, _: Client| {
                let _ = on_connect.send(Signal::Connected);
                async {}.boxed()
            })
            .on(Event::Close, move |_: Payload, _: Client| {
                let _ = on_close.send(Signal::Closed);
                async {}.boxed()
            })
            .on(Event::Error, move |payload: Payload, _: Client| {
                let message = match first_argument(payload) {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => "socket error".to_string(),
                };
                let _ = on_error.send(Signal::Failed(message));
                async {}.boxed()
            })
            .on_any(move |event: Event, payload: Payload, _: Client| {
                if let Event::Custom(name) = event {
                    match first_argument(payload).map(|data| InboundEvent::from_parts(&name, data)) {
                        Some(Ok(inbound)) => {
                            let _ = signals.send(Signal::Inbound(inbound));
                        }
                        Some(Err(e)) => warn!(%transport_id, event = %name, error = %e, "Ignoring event"),
                        None => warn!(%transport_id, event = %name, "Ignoring binary event"),
                    }
                }
                async {}.boxed()
            })
    }

    /// Forward emits and deliver signals until the connection ends.
    ///
    /// Returns `None` when the transport was closed locally.
    async fn pump(
        &mut self,
        client: &Client,
        signals: &mut mpsc::UnboundedReceiver<Signal>,
    ) -> Option<DisconnectReason> {
        let shutdown = &self.shutdown;
        let outgoing = &mut self.outgoing;
        let listeners = &self.listeners;
        let transport_id = self.transport_id;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                next = outgoing.recv() => {
                    let Some((name, payload)) = next else {
                        return None;
                    };
                    if let Err(e) = client.emit(name, Payload::Text(vec![payload])).await {
                        warn!(%transport_id, event = name, "Failed to emit: {}", e);
                        return Some(DisconnectReason::TransportError);
                    }
                }
                signal = signals.recv() => match signal {
                    Some(Signal::Inbound(event)) => {
                        debug!(%transport_id, event = %event.name(), "Received");
                        listeners.dispatch_while(&event, || !shutdown.is_cancelled());
                    }
                    Some(Signal::Closed) => return Some(DisconnectReason::ServerDisconnect),
                    Some(Signal::Failed(message)) => {
                        warn!(%transport_id, error = %message, "Socket.IO error");
                        return Some(DisconnectReason::TransportError);
                    }
                    Some(Signal::Connected) => {}
                    None => return Some(DisconnectReason::TransportClose),
                },
            }
        }
    }
}
