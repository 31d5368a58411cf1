//! Error types for the keep-alive client.

use std::io;
use thiserror::Error;

use watchdog_core::SessionId;

/// Clerk errors.
///
/// Only `SessionExpired` changes the clerk's behaviour (it registers again);
/// everything else is logged and retried.
#[derive(Error, Debug)]
pub enum ClerkError {
    /// The watcher no longer knows this session.
    #[error("Session expired: {0}")]
    SessionExpired(SessionId),

    /// Could not reach the watcher.
    #[error("Failed to connect to watcher at {addr}: {reason}")]
    Connection { addr: String, reason: String },

    /// The watcher did not answer in time.
    #[error("Call to watcher timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Protocol version mismatch with the watcher.
    #[error("Protocol version mismatch (client: {client_version}, watcher: {watcher_version})")]
    VersionMismatch {
        client_version: String,
        watcher_version: String,
    },

    /// The watcher answered with an error.
    #[error("Watcher error: {message}")]
    Server {
        message: String,
        code: Option<String>,
    },

    /// The watcher answered with an unexpected message.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The stop signal fired before the operation completed.
    #[error("Clerk stopped")]
    Stopped,

    /// I/O error passthrough.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON parse error passthrough.
    #[error("Failed to parse message: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Convenience Result type alias for clerk operations.
pub type Result<T> = std::result::Result<T, ClerkError>;
