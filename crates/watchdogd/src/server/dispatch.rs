//! Transport-agnostic request routing.

use tracing::{debug, warn};

use watchdog_protocol::{ClientMessage, DaemonMessage, MessageType, ProtocolVersion};

use crate::watcher::{WatchError, Watcher};

/// Applies one request to the watcher and builds the response.
///
/// Used by the TCP connection handler and by in-process transports.
pub async fn dispatch(watcher: &Watcher, msg: ClientMessage) -> DaemonMessage {
    let client_version = msg.protocol_version;
    if !client_version.is_compatible_with(&ProtocolVersion::CURRENT) {
        warn!(
            client_version = %client_version,
            server_version = %ProtocolVersion::CURRENT,
            "Protocol version mismatch"
        );
        return DaemonMessage::rejected(&format!(
            "Protocol version {} not compatible with server version {}",
            client_version,
            ProtocolVersion::CURRENT
        ));
    }

    match msg.message {
        MessageType::Register { name, timeout } => {
            DaemonMessage::registered(watcher.register(name, timeout).await)
        }
        MessageType::Ping { session_id } => match watcher.ping(&session_id).await {
            Ok(()) => DaemonMessage::Ack,
            Err(WatchError::SessionExpired(id)) => {
                debug!(session_id = %id, "Ping for expired session");
                DaemonMessage::session_expired(id)
            }
        },
        MessageType::Logout { session_id } => {
            watcher.logout(&session_id).await;
            DaemonMessage::Ack
        }
    }
}
