//! Per-client liveness record.
//!
//! Every field a request handler or detection loop touches is an atomic, so
//! heartbeats from unrelated clients never contend on a shared lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use watchdog_core::SessionId;

/// Server-side state of one registered client.
#[derive(Debug)]
pub struct Node {
    name: String,
    timeout: Duration,

    /// Monotonic reference point for `last_contact`
    epoch: Instant,

    /// Wall-clock time matching `epoch`, for alert records
    epoch_wall: DateTime<Utc>,

    /// Nanoseconds between `epoch` and the last successful contact
    last_contact: AtomicU64,

    online: AtomicBool,

    /// Held by at most one detection loop (see [`WatchGuard`])
    watching: AtomicBool,
}

impl Node {
    /// Creates an online node whose last contact is now.
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
            last_contact: AtomicU64::new(0),
            online: AtomicBool::new(true),
            watching: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Records a successful contact at the current instant.
    pub fn touch(&self) {
        let offset = Instant::now().saturating_duration_since(self.epoch);
        let nanos = u64::try_from(offset.as_nanos()).unwrap_or(u64::MAX);
        self.last_contact.store(nanos, Ordering::Release);
    }

    /// Monotonic instant of the last successful contact.
    pub fn last_contact(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.last_contact.load(Ordering::Acquire))
    }

    /// Wall-clock time of the last successful contact.
    pub fn last_contact_wall(&self) -> DateTime<Utc> {
        let offset = Duration::from_nanos(self.last_contact.load(Ordering::Acquire));
        let offset = chrono::Duration::from_std(offset).unwrap_or_else(|_| chrono::Duration::zero());
        self.epoch_wall + offset
    }

    /// Time elapsed since the last successful contact.
    pub fn since_last_contact(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_contact())
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Flips the node online. Returns true if it was offline (a reconnect).
    pub fn mark_online(&self) -> bool {
        self.online
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Flips the node offline. Returns true if it was online.
    ///
    /// Only the caller that wins this transition may raise an alert.
    pub fn mark_offline(&self) -> bool {
        self.online
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns true while a detection loop holds the watch guard.
    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::Acquire)
    }

    /// Acquires the watch guard, or returns `None` if another loop holds it.
    pub fn try_watch(self: &Arc<Self>) -> Option<WatchGuard> {
        self.watching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| WatchGuard {
                node: Arc::clone(self),
            })
    }

    /// Point-in-time snapshot for introspection.
    pub fn view(&self, session_id: SessionId) -> NodeView {
        NodeView {
            session_id,
            name: self.name.clone(),
            timeout: self.timeout,
            online: self.is_online(),
            watching: self.is_watching(),
            since_last_contact: self.since_last_contact(),
            last_contact: self.last_contact_wall(),
        }
    }
}

/// Exclusive right to run the detection loop for one node.
///
/// Released on drop, so every exit path of the loop gives it back.
#[derive(Debug)]
pub struct WatchGuard {
    node: Arc<Node>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.node.watching.store(false, Ordering::Release);
    }
}

/// Read-only snapshot of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub session_id: SessionId,
    pub name: String,
    pub timeout: Duration,
    pub online: bool,
    pub watching: bool,
    pub since_last_contact: Duration,
    pub last_contact: DateTime<Utc>,
}
