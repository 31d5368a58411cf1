//! Protocol message types for clerk/watcher communication.

use std::time::Duration;

use crate::version::ProtocolVersion;
use serde::{Deserialize, Serialize};
use watchdog_core::SessionId;

/// Machine-readable codes carried in [`DaemonMessage::Error`].
pub mod error_code {
    /// The session id is unknown (never issued, or already swept).
    pub const SESSION_EXPIRED: &str = "ERR_EXPIRED";

    /// The request line could not be decoded.
    pub const PARSE: &str = "ERR_PARSE";
}

/// Requests a clerk can send to the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageType {
    /// Start a new registration episode
    Register {
        /// Display name of the client
        name: String,
        /// Silence the watcher tolerates before raising an alert
        timeout: Duration,
    },

    /// Heartbeat for an existing session
    Ping {
        session_id: SessionId,
    },

    /// Client is shutting down
    Logout {
        session_id: SessionId,
    },
}

/// Messages sent from clerk to watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Protocol version
    pub protocol_version: ProtocolVersion,

    /// Message payload
    #[serde(flatten)]
    pub message: MessageType,
}

impl ClientMessage {
    /// Creates a new client message with current protocol version.
    pub fn new(message: MessageType) -> Self {
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            message,
        }
    }

    pub fn register(name: impl Into<String>, timeout: Duration) -> Self {
        Self::new(MessageType::Register {
            name: name.into(),
            timeout,
        })
    }

    pub fn ping(session_id: SessionId) -> Self {
        Self::new(MessageType::Ping { session_id })
    }

    pub fn logout(session_id: SessionId) -> Self {
        Self::new(MessageType::Logout { session_id })
    }

    /// Short name of the request, for logging.
    pub fn kind(&self) -> &'static str {
        match self.message {
            MessageType::Register { .. } => "register",
            MessageType::Ping { .. } => "ping",
            MessageType::Logout { .. } => "logout",
        }
    }
}

/// Messages sent from watcher to clerks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DaemonMessage {
    /// Registration accepted
    Registered {
        /// Freshly issued session id
        session_id: SessionId,
    },

    /// Ping or logout accepted
    Ack,

    /// Request rejected because of a protocol version mismatch
    Rejected {
        /// Reason for rejection
        reason: String,
        /// Watcher's protocol version (for the clerk to upgrade)
        protocol_version: ProtocolVersion,
    },

    /// Error response
    Error {
        /// Error message
        message: String,
        /// Error code (see [`error_code`])
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl DaemonMessage {
    pub fn registered(session_id: SessionId) -> Self {
        Self::Registered { session_id }
    }

    /// Creates a rejected response.
    pub fn rejected(reason: &str) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    /// Creates an error response.
    pub fn error(message: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: None,
        }
    }

    /// Creates an error response with code.
    pub fn error_with_code(message: &str, code: &str) -> Self {
        Self::Error {
            message: message.to_string(),
            code: Some(code.to_string()),
        }
    }

    /// Creates the response for a ping on an unknown session.
    pub fn session_expired(session_id: SessionId) -> Self {
        Self::error_with_code(
            &format!("session expired: {session_id}"),
            error_code::SESSION_EXPIRED,
        )
    }

    /// Returns true if this is a session-expired error.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Error { code: Some(code), .. } if code == error_code::SESSION_EXPIRED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_serialization() {
        let msg = ClientMessage::register("db-1", Duration::from_secs(5));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"register\""));
        assert!(json.contains("\"name\":\"db-1\""));
        assert!(json.contains("\"protocol_version\":{\"major\":1,\"minor\":0}"));
    }

    #[test]
    fn test_ping_roundtrip() {
        let id = SessionId::new();
        let json = serde_json::to_string(&ClientMessage::ping(id)).unwrap();
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.message, MessageType::Ping { session_id: id });
        assert_eq!(parsed.kind(), "ping");
    }

    #[test]
    fn test_ack_serialization() {
        let json = serde_json::to_string(&DaemonMessage::Ack).unwrap();
        assert_eq!(json, "{\"type\":\"ack\"}");
    }

    #[test]
    fn test_session_expired_code() {
        let msg = DaemonMessage::session_expired(SessionId::new());
        assert!(msg.is_session_expired());

        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"code\":\"ERR_EXPIRED\""));

        assert!(!DaemonMessage::error("boom").is_session_expired());
        assert!(!DaemonMessage::error_with_code("bad", error_code::PARSE).is_session_expired());
    }

    #[test]
    fn test_error_without_code_parses() {
        let parsed: DaemonMessage =
            serde_json::from_str("{\"type\":\"error\",\"message\":\"boom\"}").unwrap();
        assert_eq!(parsed, DaemonMessage::error("boom"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<ClientMessage, _> = serde_json::from_str(
            "{\"protocol_version\":{\"major\":1,\"minor\":0},\"type\":\"subscribe\"}",
        );
        assert!(result.is_err());
    }
}
