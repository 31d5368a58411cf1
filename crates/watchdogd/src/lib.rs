//! Watchdog Daemon - node registry, timeout detection and alert hand-off
//!
//! This crate provides the server side of the watchdog liveness monitor:
//! - `watcher` - Node registry, Register/Ping/Logout handlers, detection loops, sweep
//! - `server` - TCP request server for clerk connections
//! - `notifier` - Alert queue consumer and delivery back-ends
//! - `config` - Daemon configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      watchdogd daemon                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │  WatcherServer  │────▶│          Watcher            │    │
//! │  │     (TCP)       │     │  (registry + detection)     │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │ connections                 │ AlertRecord       │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │ConnectionHandler│     │   mpsc -> Notifier task     │    │
//! │  │ (per connection)│     │                             │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod notifier;
pub mod server;
pub mod watcher;
