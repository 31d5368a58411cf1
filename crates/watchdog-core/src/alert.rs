//! Alert records handed from the watcher to the notifier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::duration::format_duration;

/// Describes one detected heartbeat timeout.
///
/// Produced exactly once per offline transition caused by a timeout and
/// owned by the notifier after hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Display name the client registered with
    pub name: String,

    /// Silence observed when the alert was raised
    pub duration: Duration,

    /// Wall-clock time of the last successful contact
    pub last_contact: DateTime<Utc>,
}

impl AlertRecord {
    pub fn new(name: impl Into<String>, duration: Duration, last_contact: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            duration,
            last_contact,
        }
    }

    /// One-line human readable summary, used as an alert subject.
    pub fn summary(&self) -> String {
        format!(
            "client {:?} offline for {} (last contact {})",
            self.name,
            format_duration(self.duration),
            self.last_contact.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}
