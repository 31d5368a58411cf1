//! Keep-alive driver.
//!
//! A [`Clerk`] owns one logical client of the watcher. It registers
//! (retrying with exponential backoff while the watcher is unreachable),
//! pings every `interval`, registers again when the watcher reports the
//! session expired, and sends one best-effort logout on shutdown.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use watchdog_clerk::{Clerk, ClerkConfig, TcpTransport};
//!
//! let config = ClerkConfig::new("db-1", Duration::from_secs(5), Duration::from_secs(2));
//! let clerk = Arc::new(Clerk::new(config, TcpTransport::new("10.0.0.1:7070")));
//!
//! let runner = Arc::clone(&clerk);
//! let handle = tokio::spawn(async move { runner.keep_alive().await });
//!
//! // ... later, on shutdown
//! clerk.logout().await;
//! handle.await?;
//! ```

use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use watchdog_core::{format_duration, SessionId};
use watchdog_protocol::{ClientMessage, DaemonMessage, ProtocolVersion};

use crate::error::{ClerkError, Result};
use crate::transport::Transport;

/// Lower bound on the delay between registration attempts.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Configuration for a keep-alive client.
#[derive(Debug, Clone)]
pub struct ClerkConfig {
    /// Display name reported to the watcher.
    pub name: String,

    /// Silence the watcher tolerates before raising an alert.
    pub timeout: Duration,

    /// Time between pings. Must be shorter than `timeout`.
    pub interval: Duration,

    /// Initial delay before retrying a failed registration.
    pub retry_initial_delay: Duration,

    /// Maximum delay between registration attempts.
    pub retry_max_delay: Duration,

    /// Multiplier for exponential backoff (2.0 doubles the delay each retry).
    pub retry_multiplier: f64,
}

impl Default for ClerkConfig {
    fn default() -> Self {
        Self {
            name: "watchdog".to_string(),
            timeout: Duration::from_secs(10),
            interval: Duration::from_secs(5),
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            retry_multiplier: 2.0,
        }
    }
}

impl ClerkConfig {
    pub fn new(name: impl Into<String>, timeout: Duration, interval: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            interval,
            ..Self::default()
        }
    }

    /// First registration retry delay, never below [`MIN_RETRY_DELAY`].
    pub fn initial_retry_delay(&self) -> Duration {
        self.retry_initial_delay.max(MIN_RETRY_DELAY)
    }

    /// Delay to wait after `delay`, capped at `retry_max_delay` and never
    /// below [`MIN_RETRY_DELAY`].
    pub fn next_retry_delay(&self, delay: Duration) -> Duration {
        let next_delay_ms = (delay.as_millis() as f64 * self.retry_multiplier) as u64;
        Duration::from_millis(next_delay_ms)
            .min(self.retry_max_delay)
            .max(MIN_RETRY_DELAY)
    }
}

/// Client-side keep-alive driver.
pub struct Clerk<T> {
    config: ClerkConfig,
    transport: T,

    /// Current session, `None` until the first successful registration.
    session: RwLock<Option<SessionId>>,

    stop: CancellationToken,
}

impl<T: Transport> Clerk<T> {
    pub fn new(config: ClerkConfig, transport: T) -> Self {
        if config.interval >= config.timeout {
            warn!(
                name = %config.name,
                interval = %format_duration(config.interval),
                timeout = %format_duration(config.timeout),
                "Ping interval is not shorter than the timeout, the watcher will raise alerts"
            );
        }
        Self {
            config,
            transport,
            session: RwLock::new(None),
            stop: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ClerkConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The session currently in use, if any.
    pub async fn session_id(&self) -> Option<SessionId> {
        *self.session.read().await
    }

    /// Sets the stop signal without contacting the watcher.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Registers with the watcher, retrying until it succeeds.
    ///
    /// Transport failures are logged and retried with exponential backoff.
    /// Returns `ClerkError::Stopped` if the stop signal fires first.
    pub async fn register(&self) -> Result<SessionId> {
        let mut delay = self.config.initial_retry_delay();
        let mut attempt: u32 = 0;

        loop {
            if self.is_stopped() {
                return Err(ClerkError::Stopped);
            }
            attempt = attempt.saturating_add(1);

            match self.try_register().await {
                Ok(session_id) => {
                    *self.session.write().await = Some(session_id);
                    info!(
                        session_id = %session_id,
                        name = %self.config.name,
                        attempt,
                        "Registered with watcher"
                    );
                    return Ok(session_id);
                }
                Err(e) => {
                    warn!(
                        name = %self.config.name,
                        attempt,
                        error = %e,
                        retry_in = %format_duration(delay),
                        "Registration failed, will retry"
                    );
                }
            }

            tokio::select! {
                _ = sleep(delay) => {
                    delay = self.config.next_retry_delay(delay);
                }
                _ = self.stop.cancelled() => {
                    debug!(name = %self.config.name, "Registration retry cancelled");
                    return Err(ClerkError::Stopped);
                }
            }
        }
    }

    /// Pings the watcher every `interval` until stopped.
    ///
    /// An expired session triggers a fresh registration; any other failure
    /// is logged and the ping is retried after the next interval.
    pub async fn keep_alive(&self) {
        info!(
            name = %self.config.name,
            interval = %format_duration(self.config.interval),
            timeout = %format_duration(self.config.timeout),
            "Keep-alive starting"
        );

        loop {
            if self.is_stopped() {
                break;
            }

            let session_id = match self.session_id().await {
                Some(id) => id,
                None => match self.register().await {
                    Ok(id) => id,
                    Err(_) => break,
                },
            };

            match self.ping(session_id).await {
                Ok(()) => {
                    trace!(session_id = %session_id, "Ping acknowledged");
                }
                Err(ClerkError::SessionExpired(_)) => {
                    info!(
                        session_id = %session_id,
                        name = %self.config.name,
                        "Session expired, registering again"
                    );
                    self.forget_session(session_id).await;
                    continue;
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Ping failed");
                }
            }

            tokio::select! {
                _ = sleep(self.config.interval) => {}
                _ = self.stop.cancelled() => break,
            }
        }

        info!(name = %self.config.name, "Keep-alive stopped");
    }

    /// Stops the keep-alive loop and tells the watcher this client is leaving.
    ///
    /// The logout is sent once. Failures are logged and otherwise ignored.
    pub async fn logout(&self) {
        self.stop();

        let Some(session_id) = self.session_id().await else {
            debug!(name = %self.config.name, "Never registered, nothing to log out");
            return;
        };

        let result = self
            .transport
            .call(&ClientMessage::logout(session_id))
            .await
            .and_then(|reply| expect_ack(reply, session_id));

        match result {
            Ok(()) => info!(session_id = %session_id, "Logged out"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Logout failed"),
        }
    }

    async fn try_register(&self) -> Result<SessionId> {
        let request = ClientMessage::register(self.config.name.clone(), self.config.timeout);
        match check_reply(self.transport.call(&request).await?)? {
            DaemonMessage::Registered { session_id } => Ok(session_id),
            other => Err(ClerkError::ProtocolError(format!(
                "expected registered, got {other:?}"
            ))),
        }
    }

    async fn ping(&self, session_id: SessionId) -> Result<()> {
        let reply = self.transport.call(&ClientMessage::ping(session_id)).await?;
        expect_ack(reply, session_id)
    }

    /// Clears the stored session unless a newer one already replaced it.
    async fn forget_session(&self, expired: SessionId) {
        let mut session = self.session.write().await;
        if *session == Some(expired) {
            *session = None;
        }
    }
}

/// Turns `rejected` and `error` replies into typed errors.
fn check_reply(reply: DaemonMessage) -> Result<DaemonMessage> {
    match reply {
        DaemonMessage::Rejected {
            protocol_version, ..
        } => Err(ClerkError::VersionMismatch {
            client_version: ProtocolVersion::CURRENT.to_string(),
            watcher_version: protocol_version.to_string(),
        }),
        DaemonMessage::Error { message, code } => Err(ClerkError::Server { message, code }),
        other => Ok(other),
    }
}

fn expect_ack(reply: DaemonMessage, session_id: SessionId) -> Result<()> {
    if reply.is_session_expired() {
        return Err(ClerkError::SessionExpired(session_id));
    }
    match check_reply(reply)? {
        DaemonMessage::Ack => Ok(()),
        other => Err(ClerkError::ProtocolError(format!(
            "expected ack, got {other:?}"
        ))),
    }
}
