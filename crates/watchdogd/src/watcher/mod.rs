//! Node registry and timeout detection.
//!
//! The `Watcher` is a cheap-to-clone handle over the shared registry. It
//! implements the Register/Ping/Logout handlers, owns one detection task per
//! monitored node, and hands alert records to the notifier over a bounded
//! channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  register/ping/logout  ┌─────────────────────────┐
//! │ Connection   │───────────────────────▶│        Watcher          │
//! │  handlers    │                        │ HashMap<SessionId, Node>│
//! └──────────────┘                        └───────────┬─────────────┘
//!                                                     │ spawn (one per node)
//!        ┌──────────────┐   clean(bound)              ▼
//!        │ cleanup task │──────────────▶  ┌─────────────────────────┐
//!        └──────────────┘                 │     detection loop      │
//!                                         └───────────┬─────────────┘
//!                                                     │ AlertRecord (mpsc)
//!                                                     ▼
//!                                              Notifier task
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - A missing node is either a typed error (ping) or a no-op (logout)
//! - Alert hand-off never blocks a detection loop

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use watchdog_core::{AlertRecord, SessionId};

mod detector;
mod error;
mod node;
mod registry;

pub use error::WatchError;
pub use node::{Node, NodeView, WatchGuard};
pub use registry::Registry;

/// Alert queue capacity
pub const ALERT_QUEUE_CAPACITY: usize = 10;

/// How long an alert may wait for room in a full queue before it is dropped.
pub const ALERT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Default sweep cadence and bound
pub const CLEAN_INTERVAL: Duration = Duration::from_secs(60);

/// Handle to the node registry.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    /// Hand-off queue drained by the notifier
    alerts: mpsc::Sender<AlertRecord>,

    alert_send_timeout: Duration,

    /// Detection loops started since creation
    loops_started: AtomicU64,

    /// Detection loops currently running
    loops_active: AtomicUsize,
}

impl Watcher {
    /// Creates a watcher that pushes alerts into `alerts`.
    pub fn new(alerts: mpsc::Sender<AlertRecord>) -> Self {
        Self::with_alert_send_timeout(alerts, ALERT_SEND_TIMEOUT)
    }

    pub fn with_alert_send_timeout(
        alerts: mpsc::Sender<AlertRecord>,
        alert_send_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Registry::new(),
                alerts,
                alert_send_timeout,
                loops_started: AtomicU64::new(0),
                loops_active: AtomicUsize::new(0),
            }),
        }
    }

    /// Creates a watcher together with the receiving end of its alert queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AlertRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Registers a client and starts monitoring it.
    ///
    /// Never fails. Each call opens a new registration episode with its own
    /// session id, even for a name that is already registered.
    pub async fn register(&self, name: impl Into<String>, timeout: Duration) -> SessionId {
        let node = Arc::new(Node::new(name, timeout));

        let mut session_id = SessionId::new();
        while !self.inner.registry.insert(session_id, Arc::clone(&node)).await {
            session_id = SessionId::new();
        }

        let total_nodes = self.inner.registry.len().await;
        info!(
            session_id = %session_id,
            name = %node.name(),
            timeout = ?timeout,
            total_nodes,
            "New client online"
        );

        self.spawn_watch(session_id, node);
        session_id
    }

    /// Records a heartbeat.
    ///
    /// Revives an offline node and restarts detection if no loop is running.
    ///
    /// # Errors
    ///
    /// - `WatchError::SessionExpired` if no node exists under `session_id`
    pub async fn ping(&self, session_id: &SessionId) -> Result<(), WatchError> {
        let node = self
            .inner
            .registry
            .get(session_id)
            .await
            .ok_or(WatchError::SessionExpired(*session_id))?;

        node.touch();

        if node.mark_online() {
            info!(session_id = %session_id, name = %node.name(), "Client reconnected");
        }

        if !node.is_watching() {
            self.spawn_watch(*session_id, node);
        }

        Ok(())
    }

    /// Marks a node offline without raising an alert.
    ///
    /// The node stays in the registry until the sweep removes it; the grace
    /// window starts now. Unknown ids are ignored.
    pub async fn logout(&self, session_id: &SessionId) {
        match self.inner.registry.get(session_id).await {
            Some(node) => {
                node.mark_offline();
                node.touch();
                info!(session_id = %session_id, name = %node.name(), "Client logged out");
            }
            None => {
                debug!(session_id = %session_id, "Logout for unknown session ignored");
            }
        }
    }

    /// Removes every node whose last contact is older than `bound`.
    ///
    /// Online state is not considered. Returns the number of nodes removed.
    pub async fn clean(&self, bound: Duration) -> usize {
        let removed = self
            .inner
            .registry
            .retain(|_, node| node.since_last_contact() <= bound)
            .await;

        for (session_id, node) in &removed {
            info!(
                session_id = %session_id,
                name = %node.name(),
                online = node.is_online(),
                "Removed stale node"
            );
        }

        removed.len()
    }

    /// Snapshot of a single node.
    pub async fn node(&self, session_id: &SessionId) -> Option<NodeView> {
        self.inner
            .registry
            .get(session_id)
            .await
            .map(|node| node.view(*session_id))
    }

    /// Snapshots of all nodes.
    pub async fn nodes(&self) -> Vec<NodeView> {
        self.inner
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|(id, node)| node.view(id))
            .collect()
    }

    /// Number of registered nodes, online or not.
    pub async fn len(&self) -> usize {
        self.inner.registry.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.registry.is_empty().await
    }

    /// Number of detection loops currently running.
    pub fn active_watch_loops(&self) -> usize {
        self.inner.loops_active.load(Ordering::Acquire)
    }

    /// Number of detection loops started since the watcher was created.
    pub fn watch_loops_started(&self) -> u64 {
        self.inner.loops_started.load(Ordering::Acquire)
    }

    fn spawn_watch(&self, session_id: SessionId, node: Arc<Node>) {
        tokio::spawn(detector::watch(self.clone(), session_id, node));
    }

    fn loop_started(&self) {
        self.inner.loops_started.fetch_add(1, Ordering::AcqRel);
        self.inner.loops_active.fetch_add(1, Ordering::AcqRel);
    }

    fn loop_finished(&self) {
        self.inner.loops_active.fetch_sub(1, Ordering::AcqRel);
    }

    /// Queues an alert without blocking the caller.
    ///
    /// If the queue stays full for `alert_send_timeout` the record is dropped
    /// and a warning logged.
    fn emit_alert(&self, record: AlertRecord) {
        let alerts = self.inner.alerts.clone();
        let wait = self.inner.alert_send_timeout;

        tokio::spawn(async move {
            match alerts.send_timeout(record, wait).await {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(record)) => {
                    warn!(
                        name = %record.name,
                        waited = ?wait,
                        "Alert queue full, dropping alert"
                    );
                }
                Err(SendTimeoutError::Closed(record)) => {
                    warn!(name = %record.name, "Alert channel closed, dropping alert");
                }
            }
        });
    }
}

/// Spawns a background task that sweeps stale nodes every `every`.
///
/// Stops when `cancel_token` is cancelled.
pub fn spawn_cleanup_task(
    watcher: Watcher,
    every: Duration,
    bound: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Cleanup task stopping");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = watcher.clean(bound).await;
                    let remaining = watcher.len().await;
                    debug!(removed, remaining, "Swept stale nodes");
                }
            }
        }
    })
}
