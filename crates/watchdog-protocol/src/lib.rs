//! Watchdog Protocol - Wire protocol between clerks and the watcher
//!
//! Requests and responses are single JSON objects, one per line. A
//! connection may carry any number of request/response pairs.

pub mod message;
pub mod version;

pub use message::{error_code, ClientMessage, DaemonMessage, MessageType};
pub use version::{ProtocolVersion, VersionError};

/// Maximum size of a single protocol line (64 KiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
