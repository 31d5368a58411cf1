//! Per-node timeout detection loop.
//!
//! The loop is the only failure detector. It sleeps until the node's
//! deadline (last contact + timeout), re-reads the last contact on waking,
//! and declares the node offline only once strictly more than `timeout` has
//! passed without contact.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, trace, warn};

use watchdog_core::{AlertRecord, SessionId};

use super::node::Node;
use super::Watcher;

/// Added to every sleep so the wake-up lands past the deadline, not on it.
const CHECK_SLACK: Duration = Duration::from_millis(1);

/// Runs detection for `node` unless another loop already does.
///
/// After giving the guard back, the node is checked once more: a ping that
/// revived it while this loop was finishing would otherwise find the guard
/// still held and skip starting a new loop.
pub(crate) async fn watch(watcher: Watcher, session_id: SessionId, node: Arc<Node>) {
    loop {
        let Some(guard) = node.try_watch() else {
            trace!(session_id = %session_id, "Detection loop already running");
            return;
        };

        watcher.loop_started();
        debug!(session_id = %session_id, name = %node.name(), "Detection loop started");

        check_until_offline(&watcher, session_id, &node).await;

        watcher.loop_finished();
        drop(guard);

        debug!(session_id = %session_id, name = %node.name(), "Detection loop stopped");

        if !node.is_online() {
            return;
        }
        debug!(session_id = %session_id, "Node came back online while loop was stopping");
    }
}

async fn check_until_offline(watcher: &Watcher, session_id: SessionId, node: &Node) {
    while node.is_online() {
        let elapsed = node.since_last_contact();

        if elapsed > node.timeout() {
            // Logout may have flipped the node between the two reads; only
            // the timeout transition raises an alert.
            if node.mark_offline() {
                warn!(
                    session_id = %session_id,
                    name = %node.name(),
                    silent_for = ?elapsed,
                    timeout = ?node.timeout(),
                    "Client is offline"
                );
                watcher.emit_alert(AlertRecord::new(
                    node.name(),
                    elapsed,
                    node.last_contact_wall(),
                ));
            }
            return;
        }

        // Timeouts come off the wire and may be close to Duration::MAX
        sleep(node.timeout().saturating_sub(elapsed).saturating_add(CHECK_SLACK)).await;
    }
}
