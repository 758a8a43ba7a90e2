//! Scriptable in-memory transport
//!
//! `MockTransport` records what the session emits and lets tests play the
//! part of the transport library: raise lifecycle events, deliver inbound
//! events, and observe open/close calls. `MockTransportFactory` keeps every
//! transport it built so tests can reach them after `connect`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{Transport, TransportFactory, TransportId, TransportOptions};
use crate::error::TransportError;
use crate::events::{DisconnectReason, InboundEvent, ListenerRegistry, OutboundEvent};

/// In-memory [`Transport`] driven by the test
pub struct MockTransport {
    id: TransportId,
    options: TransportOptions,
    listeners: ListenerRegistry,
    connected: AtomicBool,
    closed: AtomicBool,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    emitted: Mutex<Vec<OutboundEvent>>,
}

impl MockTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self {
            id: TransportId::new(),
            options,
            listeners: ListenerRegistry::new(),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            open_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            emitted: Mutex::new(Vec::new()),
        }
    }

    /// Mark the connection live and raise `connect`.
    pub fn simulate_connect(&self) {
        self.connected.store(true, Ordering::SeqCst);
        self.deliver(InboundEvent::Connect);
    }

    /// Mark the connection lost and raise `disconnect`.
    pub fn simulate_disconnect(&self, reason: DisconnectReason) {
        self.connected.store(false, Ordering::SeqCst);
        self.deliver(InboundEvent::Disconnect { reason });
    }

    pub fn simulate_connect_error(&self, message: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.deliver(InboundEvent::ConnectError {
            message: message.to_string(),
        });
    }

    pub fn simulate_reconnect_attempt(&self, attempt: u32) {
        self.deliver(InboundEvent::ReconnectAttempt { attempt });
    }

    /// Dispatch an event to listeners, as if it came off the wire.
    ///
    /// Returns how many listeners ran; always 0 once closed.
    pub fn deliver(&self, event: InboundEvent) -> usize {
        if self.closed.load(Ordering::SeqCst) {
            return 0;
        }
        self.listeners.dispatch(&event)
    }

    /// Every event emitted so far, oldest first
    pub fn emitted(&self) -> Vec<OutboundEvent> {
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
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
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.open_calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Err(TransportError::AlreadyOpened);
        }
        Ok(())
    }

    fn emit(&self, event: &OutboundEvent) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.emitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.listeners.clear();
    }
}

/// Factory that hands out [`MockTransport`]s and remembers them
#[derive(Default)]
pub struct MockTransportFactory {
    created: Mutex<Vec<Arc<MockTransport>>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transport built so far, oldest first
    pub fn created(&self) -> Vec<Arc<MockTransport>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn created_count(&self) -> usize {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The most recently built transport
    pub fn last(&self) -> Option<Arc<MockTransport>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self, options: TransportOptions) -> Result<Arc<dyn Transport>, TransportError> {
        let transport = Arc::new(MockTransport::new(options));
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&transport));
        Ok(transport as Arc<dyn Transport>)
    }
}
