//! Watchdog Core - Shared types for heartbeat liveness monitoring
//!
//! This crate provides the domain types shared between
//! the watcher daemon (watchdogd) and the keep-alive client (watchdog-clerk).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod alert;
pub mod duration;
pub mod error;
pub mod session;

// Re-exports for convenience
pub use alert::AlertRecord;
pub use duration::{format_duration, parse_duration};
pub use error::{DomainError, DomainResult};
pub use session::SessionId;
