//! WebSocket transport
//!
//! Carries [`OutboundEvent`]/[`InboundEvent`] frames as JSON text messages
//! over `tokio-tungstenite`. A single driver task per transport connects,
//! pumps frames in both directions, and applies the reconnection policy.
//!
//! ```text
//!  emit() ──► mpsc ──► driver ──► sink ──► server
//!                        │
//!  listeners ◄─ dispatch ◄─ stream ◄────── server
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Transport, TransportFactory, TransportId, TransportOptions};
use crate::config::TransportKind;
use crate::error::TransportError;
use crate::events::{DisconnectReason, InboundEvent, ListenerRegistry, OutboundEvent};
use crate::reconnect::ReconnectBudget;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Header carrying the bound user id on the upgrade request
pub const USER_ID_HEADER: &str = "x-user-id";

/// Map an `http(s)`/`ws(s)` endpoint to the WebSocket URL to dial.
pub fn websocket_url(endpoint: &str) -> Result<Url, TransportError> {
    let invalid = |reason: String| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    let mut url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {other:?}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch to {scheme}")))?;
    Ok(url)
}

/// [`Transport`] over a WebSocket connection
pub struct WebSocketTransport {
    id: TransportId,
    url: Url,
    options: TransportOptions,
    listeners: ListenerRegistry,
    connected: Arc<AtomicBool>,
    outgoing_tx: mpsc::UnboundedSender<String>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("id", &self.id)
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    pub fn new(options: TransportOptions) -> Result<Self, TransportError> {
        if options.transport_kinds.is_empty() {
            return Err(TransportError::NoTransportKinds);
        }
        let url = websocket_url(&options.endpoint)?;
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

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Transport for WebSocketTransport {
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
            connector: Connector {
                transport_id: self.id,
                url: self.url.clone(),
                options: self.options.clone(),
            },
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
        let frame = event.encode_frame()?;
        debug!(transport_id = %self.id, "Sending: {}", frame);
        self.outgoing_tx
            .send(frame)
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

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Builds [`WebSocketTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransportFactory;

impl TransportFactory for WebSocketTransportFactory {
    fn create(
        &self,
        options: TransportOptions,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        Ok(Arc::new(WebSocketTransport::new(options)?) as Arc<dyn Transport>)
    }
}

/// Dials the backend with the configured transport kinds and auth
struct Connector {
    transport_id: TransportId,
    url: Url,
    options: TransportOptions,
}

/// Background task owning the socket for one transport
struct Driver {
    connector: Connector,
    listeners: ListenerRegistry,
    connected: Arc<AtomicBool>,
    outgoing: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let mut budget = ReconnectBudget::new(self.connector.options.reconnection.clone());

        loop {
            let established = tokio::select! {
                _ = self.shutdown.cancelled() => return,
                result = self.connector.establish() => result,
            };

            match established {
                Ok(stream) => {
                    budget.reset();
                    self.connected.store(true, Ordering::SeqCst);
                    info!(transport_id = %self.connector.transport_id, url = %self.connector.url, "Connected");
                    self.dispatch(&InboundEvent::Connect);

                    let Some(reason) = self.pump(stream).await else {
                        self.connected.store(false, Ordering::SeqCst);
                        return;
                    };
                    self.connected.store(false, Ordering::SeqCst);
                    info!(transport_id = %self.connector.transport_id, %reason, "Disconnected");
                    self.dispatch(&InboundEvent::Disconnect {
                        reason: reason.clone(),
                    });
                    if !reason.allows_reconnect() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(transport_id = %self.connector.transport_id, error = %e, "Connection attempt failed");
                    self.dispatch(&InboundEvent::ConnectError {
                        message: e.to_string(),
                    });
                }
            }

            let Some((attempt, delay)) = budget.next_attempt() else {
                if self.connector.options.reconnection.enabled {
                    error!(
                        transport_id = %self.connector.transport_id,
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
            debug!(transport_id = %self.connector.transport_id, attempt, "Reconnecting");
            self.dispatch(&InboundEvent::ReconnectAttempt { attempt });
        }
    }
}

impl Connector {
    /// Try each configured transport kind in order.
    async fn establish(&self) -> Result<WsStream, TransportError> {
        let mut last_error = TransportError::NoTransportKinds;

        for kind in &self.options.transport_kinds {
            match kind {
                TransportKind::WebSocket => match self.connect_websocket().await {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        debug!(transport_id = %self.transport_id, error = %e, "WebSocket connect failed");
                        last_error = e;
                    }
                },
                TransportKind::Polling => {
                    debug!(transport_id = %self.transport_id, kind = %kind, "Skipping unsupported transport kind");
                    if matches!(last_error, TransportError::NoTransportKinds) {
                        last_error = TransportError::UnsupportedKind(*kind);
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn connect_websocket(&self) -> Result<WsStream, TransportError> {
        let connect_err = |e: &dyn std::fmt::Display| TransportError::Connect(e.to_string());

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| connect_err(&e))?;
        let auth = &self.options.auth;
        let headers = request.headers_mut();
        headers.insert(
            USER_ID_HEADER,
            HeaderValue::from_str(&auth.user_id.to_string()).map_err(|e| connect_err(&e))?,
        );
        if let Some(token) = &auth.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| connect_err(&e))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let (stream, _response) = connect_async(request).await.map_err(|e| connect_err(&e))?;
        Ok(stream)
    }
}

impl Driver {
    /// Listeners stop being called as soon as the transport is closed.
    fn dispatch(&self, event: &InboundEvent) {
        self.listeners
            .dispatch_while(event, || !self.shutdown.is_cancelled());
    }

    /// Pump frames until the connection ends.
    ///
    /// Returns `None` when the transport was closed locally.
    async fn pump(&mut self, stream: WsStream) -> Option<DisconnectReason> {
        let (mut sink, mut source) = stream.split();
        let shutdown = &self.shutdown;
        let outgoing = &mut self.outgoing;
        let listeners = &self.listeners;
        let transport_id = self.connector.transport_id;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return None;
                }
                frame = outgoing.recv() => {
                    let Some(frame) = frame else {
                        let _ = sink.send(Message::Close(None)).await;
                        return None;
                    };
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        warn!(%transport_id, "Failed to send WebSocket message: {}", e);
                        return Some(DisconnectReason::TransportError);
                    }
                }
                incoming = source.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let text_str: &str = &text;
                        debug!(%transport_id, "Received: {}", text_str);
                        match InboundEvent::decode_frame(text_str) {
                            Ok(event) => {
                                listeners.dispatch_while(&event, || !shutdown.is_cancelled());
                            }
                            Err(e) => warn!(%transport_id, error = %e, "Ignoring frame"),
                        }
                    }
                    Some(Ok(Message::Close(_))) => return Some(DisconnectReason::ServerDisconnect),
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_) | Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!(%transport_id, "WebSocket error: {}", e);
                        return Some(DisconnectReason::TransportError);
                    }
                    None => return Some(DisconnectReason::TransportClose),
                },
            }
        }
    }
}
