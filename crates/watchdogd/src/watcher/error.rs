//! Errors returned by watcher operations.

use thiserror::Error;

use watchdog_core::SessionId;

/// Errors that can occur during watcher operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// No node is registered under this id, either because it was never
    /// issued or because the sweep already removed it.
    ///
    /// Recoverable: the clerk registers again.
    #[error("session expired: {0}")]
    SessionExpired(SessionId),
}
