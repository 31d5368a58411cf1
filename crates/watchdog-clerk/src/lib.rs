//! Watchdog Clerk - keep-alive client for the watchdog liveness monitor
//!
//! A [`Clerk`] registers with the watcher, pings on a fixed interval,
//! registers again when its session expires, and logs out on shutdown.
//! Requests travel over a [`Transport`]; [`TcpTransport`] dials the watcher
//! once per call.
//!
//! **Panic-Free Policy:** no `.unwrap()`, `.expect()`, `panic!()`,
//! `unreachable!()`, or `todo!()` outside tests.

pub mod clerk;
pub mod error;
pub mod transport;

pub use clerk::{Clerk, ClerkConfig, MIN_RETRY_DELAY};
pub use error::{ClerkError, Result};
pub use transport::{TcpTransport, Transport};
