//! Alert delivery.
//!
//! The watcher only produces `AlertRecord`s; a notifier task drains the
//! alert queue and hands each record to a [`Notifier`]. Delivery failures are
//! logged and never retried, and they never feed back into node state.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use watchdog_core::{format_duration, AlertRecord};

/// Default limit on how long an external notify command may run.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while delivering an alert.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to encode alert: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to run {program}: {error}")]
    Spawn { program: String, error: String },

    #[error("{program} exited with {status}")]
    CommandFailed { program: String, status: String },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

/// Accepts alert records and attempts delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    async fn deliver(&self, record: &AlertRecord) -> Result<(), NotifyError>;
}

/// Writes alerts to the log. Used when no notify command is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, record: &AlertRecord) -> Result<(), NotifyError> {
        warn!(
            name = %record.name,
            silent_for = %format_duration(record.duration),
            last_contact = %record.last_contact,
            "ALERT: client offline"
        );
        Ok(())
    }
}

/// Runs an external program once per alert, with the record as JSON on stdin.
///
/// This is the seam for mail, chat or pager integrations, which live outside
/// the daemon. The subject line is exported as `WATCHDOG_SUBJECT`.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: COMMAND_TIMEOUT,
        }
    }

    /// Builds a notifier from `[program, args...]`; `None` if empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, payload: Vec<u8>, subject: String) -> Result<(), NotifyError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("WATCHDOG_SUBJECT", subject)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NotifyError::Spawn {
                program: self.program.clone(),
                error: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A program that ignores stdin may close it early; its exit
            // status is what counts.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(program = %self.program, error = %e, "Notify command closed stdin");
            }
        }

        let status = child.wait().await.map_err(|e| NotifyError::Spawn {
            program: self.program.clone(),
            error: e.to_string(),
        })?;

        if status.success() {
            Ok(())
        } else {
            Err(NotifyError::CommandFailed {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    fn name(&self) -> &str {
        &self.program
    }

    async fn deliver(&self, record: &AlertRecord) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(record)?;

        match timeout(self.timeout, self.run(payload, record.summary())).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout {
                program: self.program.clone(),
                timeout: self.timeout,
            }),
        }
    }
}

/// Spawns the task that drains the alert queue into `notifier`.
///
/// Runs until every sender of the queue is dropped.
pub fn spawn_notifier(
    notifier: Arc<dyn Notifier>,
    mut alerts: mpsc::Receiver<AlertRecord>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(notifier = %notifier.name(), "Notifier started");

        while let Some(record) = alerts.recv().await {
            match notifier.deliver(&record).await {
                Ok(()) => {
                    debug!(notifier = %notifier.name(), name = %record.name, "Alert delivered");
                }
                Err(e) => {
                    warn!(
                        notifier = %notifier.name(),
                        name = %record.name,
                        error = %e,
                        "Alert delivery failed"
                    );
                }
            }
        }

        info!(notifier = %notifier.name(), "Notifier stopped (alert channel closed)");
    })
}
