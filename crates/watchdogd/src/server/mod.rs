//! TCP request server for the watcher daemon.
//!
//! The server:
//! - Listens on a TCP address for clerk connections
//! - Spawns a ConnectionHandler for each connection
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  WatcherServer  │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐  dispatch  ┌─────────────────┐
//! │ConnectionHandler│───────────▶│     Watcher     │
//! │ (per connection)│            │                 │
//! └─────────────────┘            └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the server keeps accepting

mod connection;
mod dispatch;

pub use connection::{ConnectionError, ConnectionHandler};
pub use dispatch::dispatch;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::watcher::Watcher;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:7070";

/// TCP server answering Register/Ping/Logout requests.
pub struct WatcherServer {
    listener: TcpListener,

    /// Handle to the node registry
    watcher: Watcher,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for log correlation
    connection_counter: AtomicU64,
}

impl WatcherServer {
    /// Binds the listener. Use port 0 for an ephemeral port.
    pub async fn bind(
        addr: &str,
        watcher: Watcher,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_string(),
                error: e.to_string(),
            })?;

        Ok(Self {
            listener,
            watcher,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))
    }

    /// Accepts connections until the cancellation token is triggered.
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.local_addr()?;
        info!(addr = %addr, "Watcher server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            tracing::trace!(peer = %peer, connection = conn_num, "Accepted connection");
                            self.handle_connection(stream, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    fn handle_connection(&self, stream: tokio::net::TcpStream, connection_number: u64) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(reader, writer, self.watcher.clone(), connection_number);
        tokio::spawn(handler.run());
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:80".to_string(),
            error: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("0.0.0.0:80"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let (watcher, _alerts) = Watcher::channel(4);
        let server = WatcherServer::bind("127.0.0.1:0", watcher, CancellationToken::new())
            .await
            .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_invalid_address() {
        let (watcher, _alerts) = Watcher::channel(4);
        let result = WatcherServer::bind("not an address", watcher, CancellationToken::new()).await;
        assert!(matches!(result, Err(ServerError::Bind { .. })));
    }
}
