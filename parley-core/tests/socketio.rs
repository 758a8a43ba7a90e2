//! Socket.IO transport lifecycle without a reachable backend
//!
//! The port is bound and released first, so every handshake is refused and
//! the reconnection budget drives the event sequence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;

use parley_core::transport::{SocketIoTransport, Transport};
use parley_core::{
    ClientConfig, ConnectionState, EventName, InboundEvent, ReconnectConfig, Session,
    StaticCredentials, TransportKind,
};

const WAIT: Duration = Duration::from_secs(10);

async fn closed_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}/", listener.local_addr().unwrap());
    drop(listener);
    endpoint
}

fn record(session: &Session, log: &Arc<Mutex<Vec<EventName>>>) {
    for name in [
        EventName::ConnectError,
        EventName::ReconnectAttempt,
        EventName::ReconnectFailed,
    ] {
        let log = Arc::clone(log);
        session.on(name, move |event: &InboundEvent| {
            log.lock().unwrap().push(event.name());
        });
    }
}

#[tokio::test]
async fn unreachable_backend_exhausts_reconnect_budget() {
    let endpoint = closed_endpoint().await;
    let config = ClientConfig::default().with_endpoint(&endpoint).with_reconnect(
        ReconnectConfig::default()
            .with_max_attempts(2)
            .with_delay(Duration::from_millis(20)),
    );
    let session = Session::socket_io(config, Arc::new(StaticCredentials::new("tok")));
    let log = Arc::new(Mutex::new(Vec::new()));
    let (failed_tx, mut failed_rx) = tokio::sync::mpsc::unbounded_channel();

    let handle = session
        .connect_with("u1", |session| {
            record(session, &log);
            session.on(EventName::ReconnectFailed, move |_| {
                let _ = failed_tx.send(());
            });
        })
        .unwrap();
    assert_eq!(handle.endpoint(), endpoint.trim_end_matches('/'));

    timeout(WAIT, failed_rx.recv()).await.unwrap().unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            EventName::ConnectError,
            EventName::ReconnectAttempt,
            EventName::ConnectError,
            EventName::ReconnectAttempt,
            EventName::ConnectError,
            EventName::ReconnectFailed,
        ]
    );
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(!session.is_connected());
    session.disconnect();
}

#[tokio::test]
async fn polling_only_backend_failure_is_reported_once_per_attempt() {
    let endpoint = closed_endpoint().await;
    let config = ClientConfig::default()
        .with_endpoint(&endpoint)
        .with_transport_kinds(vec![TransportKind::Polling])
        .with_reconnect(ReconnectConfig::disabled());
    let session = Session::socket_io(config, Arc::new(StaticCredentials::anonymous()));
    let (error_tx, mut error_rx) = tokio::sync::mpsc::unbounded_channel();

    session
        .connect_with("u1", |session| {
            session.on_connect_error(move |message| {
                let _ = error_tx.send(message.to_string());
            });
        })
        .unwrap();

    let message = timeout(WAIT, error_rx.recv()).await.unwrap().unwrap();
    assert!(message.starts_with("Connection failed"), "{message}");
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.bound_user().map(|u| u.to_string()), Some("u1".to_string()));

    // Reconnection is off: nothing else arrives
    assert!(
        timeout(Duration::from_millis(200), error_rx.recv())
            .await
            .is_err()
    );
    session.disconnect();
}

#[tokio::test]
async fn closed_transport_never_reports_connect() {
    let endpoint = closed_endpoint().await;
    let transport = SocketIoTransport::new(parley_core::transport::TransportOptions {
        endpoint,
        auth: parley_core::transport::AuthPayload {
            token: None,
            user_id: "u1".into(),
        },
        transport_kinds: vec![TransportKind::WebSocket, TransportKind::Polling],
        reconnection: ReconnectConfig::default().with_delay(Duration::from_millis(10)),
    })
    .unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        transport.listeners().on(EventName::ConnectError, move |event| {
            seen.lock().unwrap().push(event.clone());
        });
    }

    transport.open().unwrap();
    transport.close();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(seen.lock().unwrap().is_empty());
    assert!(!transport.is_connected());
}
