//! Integration tests for the TCP request server.
//!
//! These run on the real clock against a server bound to an ephemeral port.
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use watchdog_core::{AlertRecord, SessionId};
use watchdog_protocol::{error_code, ClientMessage, DaemonMessage, ProtocolVersion};
use watchdogd::server::WatcherServer;
use watchdogd::watcher::Watcher;

/// Upper bound on any single response
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    watcher: Watcher,
    alerts: mpsc::Receiver<AlertRecord>,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn spawn() -> Self {
        let (watcher, alerts) = Watcher::channel(8);
        let cancel_token = CancellationToken::new();

        let server = WatcherServer::bind("127.0.0.1:0", watcher.clone(), cancel_token.clone())
            .await
            .expect("bind ephemeral port");
        let addr = server.local_addr().expect("local addr");

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            addr,
            watcher,
            alerts,
            cancel_token,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect to server");
        let (reader, writer) = stream.into_split();
        TestClient {
            reader: BufReader::new(reader),
            writer,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> DaemonMessage {
        let mut line = String::new();
        timeout(RESPONSE_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("response in time")
            .expect("read response");
        serde_json::from_str(line.trim()).expect("valid response json")
    }

    async fn call(&mut self, msg: ClientMessage) -> DaemonMessage {
        let json = serde_json::to_string(&msg).unwrap();
        self.send_raw(&json).await;
        self.recv().await
    }

    async fn register(&mut self, name: &str, timeout: Duration) -> SessionId {
        match self.call(ClientMessage::register(name, timeout)).await {
            DaemonMessage::Registered { session_id } => session_id,
            other => panic!("expected Registered, got {other:?}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_register_ping_logout_over_tcp() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let id = client.register("tcp-1", Duration::from_secs(5)).await;
    assert_eq!(server.watcher.len().await, 1);

    assert_eq!(client.call(ClientMessage::ping(id)).await, DaemonMessage::Ack);
    assert_eq!(client.call(ClientMessage::logout(id)).await, DaemonMessage::Ack);

    let view = server.watcher.node(&id).await.expect("still registered");
    assert!(!view.online);
}

#[tokio::test]
async fn test_one_request_per_connection() {
    let server = TestServer::spawn().await;

    let id = server.connect().await.register("dialer", Duration::from_secs(5)).await;
    let reply = server.connect().await.call(ClientMessage::ping(id)).await;
    assert_eq!(reply, DaemonMessage::Ack);
}

#[tokio::test]
async fn test_ping_unknown_session_returns_expired_code() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    match client.call(ClientMessage::ping(SessionId::new())).await {
        DaemonMessage::Error { code, .. } => {
            assert_eq!(code.as_deref(), Some(error_code::SESSION_EXPIRED));
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_request_keeps_connection_open() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    client.send_raw("{ this is not json").await;
    match client.recv().await {
        DaemonMessage::Error { code, .. } => assert_eq!(code.as_deref(), Some(error_code::PARSE)),
        other => panic!("expected Error, got {other:?}"),
    }

    let id = client.register("after-garbage", Duration::from_secs(5)).await;
    assert!(server.watcher.node(&id).await.is_some());
}

#[tokio::test]
async fn test_incompatible_version_rejected() {
    let server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let mut msg = ClientMessage::register("future", Duration::from_secs(5));
    msg.protocol_version = ProtocolVersion::new(9, 0);

    match client.call(msg).await {
        DaemonMessage::Rejected { protocol_version, .. } => {
            assert_eq!(protocol_version, ProtocolVersion::CURRENT);
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
    assert!(server.watcher.is_empty().await);
}

#[tokio::test]
async fn test_silent_client_alert_over_tcp() {
    let mut server = TestServer::spawn().await;
    let mut client = server.connect().await;

    let id = client.register("short", Duration::from_millis(100)).await;

    let record = timeout(Duration::from_secs(2), server.alerts.recv())
        .await
        .expect("alert in time")
        .expect("channel open");
    assert_eq!(record.name, "short");
    assert!(record.duration > Duration::from_millis(100));

    // Reconnect over the wire
    assert_eq!(client.call(ClientMessage::ping(id)).await, DaemonMessage::Ack);
    assert!(server.watcher.node(&id).await.map(|v| v.online).unwrap_or(false));
}

#[tokio::test]
async fn test_server_stops_on_cancel() {
    let (watcher, _alerts) = Watcher::channel(4);
    let cancel_token = CancellationToken::new();
    let server = WatcherServer::bind("127.0.0.1:0", watcher, cancel_token.clone())
        .await
        .unwrap();

    let handle = tokio::spawn(async move { server.run().await });
    cancel_token.cancel();

    let result = timeout(Duration::from_secs(1), handle)
        .await
        .expect("server stops")
        .expect("no panic");
    assert!(result.is_ok());
}
