//! Request/response channel between a clerk and the watcher.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

use watchdog_protocol::{ClientMessage, DaemonMessage, MAX_MESSAGE_SIZE};

use crate::error::{ClerkError, Result};

/// Default limit for one request/response round trip.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Carries one request to the watcher and returns its response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, request: &ClientMessage) -> Result<DaemonMessage>;
}

/// Dials the watcher over TCP for every call.
///
/// A fresh connection per call means a restarted watcher is picked up
/// without any reconnect bookkeeping.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    call_timeout: Duration,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            call_timeout: CALL_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn round_trip(&self, request: &ClientMessage) -> Result<DaemonMessage> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| ClerkError::Connection {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true)?;

        let (reader, mut writer) = stream.into_split();

        let mut json = serde_json::to_string(request)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;

        let mut line = String::new();
        let limit = u64::try_from(MAX_MESSAGE_SIZE).unwrap_or(u64::MAX).saturating_add(1);
        let bytes_read = BufReader::new(reader)
            .take(limit)
            .read_line(&mut line)
            .await?;
        if bytes_read == 0 {
            return Err(ClerkError::ProtocolError(
                "watcher closed the connection without a response".to_string(),
            ));
        }
        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ClerkError::ProtocolError(format!(
                "response too large: {} bytes",
                line.len()
            )));
        }

        let response = serde_json::from_str(line.trim())?;
        trace!(addr = %self.addr, request = request.kind(), "Call complete");
        Ok(response)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, request: &ClientMessage) -> Result<DaemonMessage> {
        timeout(self.call_timeout, self.round_trip(request))
            .await
            .map_err(|_| ClerkError::Timeout(self.call_timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use watchdog_core::SessionId;

    #[tokio::test]
    async fn test_call_reads_single_line_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
            assert!(line.contains("\"type\":\"ping\""));
            writer.write_all(b"{\"type\":\"ack\"}\n").await.unwrap();
        });

        let transport = TcpTransport::new(addr.to_string());
        let reply = transport.call(&ClientMessage::ping(SessionId::new())).await.unwrap();
        assert_eq!(reply, DaemonMessage::Ack);
    }

    #[tokio::test]
    async fn test_call_to_closed_port_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = TcpTransport::new(addr.to_string());
        let err = transport
            .call(&ClientMessage::ping(SessionId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClerkError::Connection { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_call_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport =
            TcpTransport::new(addr.to_string()).with_call_timeout(Duration::from_millis(100));
        let err = transport
            .call(&ClientMessage::ping(SessionId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClerkError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_connection_closed_without_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, _writer) = stream.into_split();
            let mut line = String::new();
            BufReader::new(reader).read_line(&mut line).await.unwrap();
        });

        let transport = TcpTransport::new(addr.to_string());
        let err = transport
            .call(&ClientMessage::ping(SessionId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClerkError::ProtocolError(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_oversized_response_is_cut_off() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Streams bytes without ever sending a newline
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (_reader, mut writer) = stream.into_split();
            let chunk = vec![b'a'; 8192];
            while writer.write_all(&chunk).await.is_ok() {}
        });

        let transport =
            TcpTransport::new(addr.to_string()).with_call_timeout(Duration::from_secs(5));
        let err = transport
            .call(&ClientMessage::ping(SessionId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ClerkError::ProtocolError(_)), "got {err:?}");
    }
}
