//! Connection handler for individual clerk connections.
//!
//! Each TCP connection gets its own `ConnectionHandler` that reads one JSON
//! request per line, dispatches it to the watcher, and writes one JSON
//! response per line. Clerks usually send a single request per connection,
//! but pipelining several is allowed.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Malformed requests get an error response; the connection stays open
//! - I/O errors and timeouts close the connection gracefully

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::{debug, warn};

use watchdog_protocol::{error_code, ClientMessage, DaemonMessage, MAX_MESSAGE_SIZE};

use super::dispatch::dispatch;
use crate::watcher::Watcher;

/// Read timeout for idle connections (30 seconds)
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handler for a single clerk.
pub struct ConnectionHandler {
    /// Buffered reader for incoming requests
    reader: BufReader<OwnedReadHalf>,

    /// Buffered writer for responses
    writer: BufWriter<OwnedWriteHalf>,

    /// Handle to the node registry
    watcher: Watcher,

    /// Number assigned by the accept loop, for logs
    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        watcher: Watcher,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            watcher,
            connection_number,
        }
    }

    /// Serves requests until the peer closes the connection or an
    /// unrecoverable error occurs.
    pub async fn run(mut self) {
        debug!(connection = self.connection_number, "Client connected");

        if let Err(e) = self.process_messages().await {
            debug!(
                connection = self.connection_number,
                error = %e,
                "Connection closed"
            );
        }
    }

    async fn process_messages(&mut self) -> Result<(), ConnectionError> {
        loop {
            let msg = match timeout(READ_TIMEOUT, self.read_message()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(ConnectionError::Eof)) => return Ok(()),
                Ok(Err(ConnectionError::ParseError(reason))) => {
                    warn!(
                        connection = self.connection_number,
                        error = %reason,
                        "Malformed request"
                    );
                    self.send_message(DaemonMessage::error_with_code(
                        &format!("Malformed request: {reason}"),
                        error_code::PARSE,
                    ))
                    .await?;
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(ConnectionError::Timeout),
            };

            debug!(
                connection = self.connection_number,
                request = msg.kind(),
                "Received request"
            );

            let response = dispatch(&self.watcher, msg).await;
            self.send_message(response).await?;
        }
    }

    /// Reads one request line, refusing lines over `MAX_MESSAGE_SIZE`.
    async fn read_message(&mut self) -> Result<ClientMessage, ConnectionError> {
        let mut line = String::new();
        let limit = u64::try_from(MAX_MESSAGE_SIZE).unwrap_or(u64::MAX).saturating_add(1);

        let bytes_read = (&mut self.reader)
            .take(limit)
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        serde_json::from_str(line.trim()).map_err(|e| ConnectionError::ParseError(e.to_string()))
    }

    async fn send_message(&mut self, msg: DaemonMessage) -> Result<(), ConnectionError> {
        let json =
            serde_json::to_string(&msg).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

        let writer = &mut self.writer;
        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => Err(ConnectionError::WriteTimeout),
        }
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
        assert!(err.to_string().contains(&MAX_MESSAGE_SIZE.to_string()));
    }
}
