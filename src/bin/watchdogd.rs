//! Watchdog Daemon - heartbeat watcher
//!
//! This binary runs the watcher: it accepts Register/Ping/Logout requests
//! from clerks over TCP, raises an alert when a client goes silent, and
//! sweeps stale registrations.
//!
//! # Usage
//!
//! ```bash
//! # Start the watcher (foreground)
//! watchdogd start
//!
//! # Start in the background with a config file
//! watchdogd start -d --config /etc/watchdog/watchdogd.toml
//!
//! # Listen somewhere else
//! WATCHDOG_ADDR=127.0.0.1:9000 watchdogd start
//!
//! # Enable debug logging
//! RUST_LOG=watchdogd=debug watchdogd start
//!
//! # Stop the daemon
//! watchdogd stop
//!
//! # Check daemon status
//! watchdogd status
//! ```

use std::env;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use watchdogd::config::WatcherConfig;
use watchdogd::notifier::{spawn_notifier, CommandNotifier, LogNotifier, Notifier};
use watchdogd::server::WatcherServer;
use watchdogd::watcher::{spawn_cleanup_task, Watcher};

/// Overrides the listen address from the config file
const ADDR_ENV: &str = "WATCHDOG_ADDR";

/// Watchdog daemon - heartbeat liveness monitor
#[derive(Parser, Debug)]
#[command(name = "watchdogd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to listen on (overrides config and WATCHDOG_ADDR)
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("watchdog")
}

fn pid_file_path() -> PathBuf {
    state_dir().join("watchdogd.pid")
}

fn log_file_path() -> PathBuf {
    state_dir().join("watchdogd.log")
}

fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if is_process_running(pid) {
            return Some(pid);
        }
        // Stale PID file
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let pid = i32::try_from(pid).context("PID out of range")?;
        let result = unsafe { libc::kill(pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

/// Config file, then `WATCHDOG_ADDR`, then `--listen`.
fn load_config(path: Option<PathBuf>, listen: Option<String>) -> Result<WatcherConfig> {
    let mut config = match path {
        Some(path) => WatcherConfig::load(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => WatcherConfig::default(),
    };

    if let Ok(addr) = env::var(ADDR_ENV) {
        config.listen = addr;
    }
    if let Some(addr) = listen {
        config.listen = addr;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
        listen: None,
    });

    match command {
        Command::Start {
            daemon,
            config,
            listen,
        } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'watchdogd stop' to stop it first.");
                process::exit(1);
            }

            // Config errors are reported before detaching from the terminal
            let config = load_config(config, listen)?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                println!("Log: {}", log_file_path().display());
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

fn build_notifier(config: &WatcherConfig) -> Arc<dyn Notifier> {
    match config
        .notify_command
        .as_deref()
        .and_then(CommandNotifier::from_argv)
    {
        Some(command) => Arc::new(command),
        None => Arc::new(LogNotifier),
    }
}

#[tokio::main]
async fn run_daemon(config: WatcherConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("watchdogd=info".parse()?)
                .add_directive("watchdog_core=info".parse()?)
                .add_directive("watchdog_protocol=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Watchdog daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let (alerts_tx, alerts_rx) = tokio::sync::mpsc::channel(config.alert_queue_capacity);
    let watcher = Watcher::with_alert_send_timeout(alerts_tx, config.alert_send_timeout());

    let notifier = build_notifier(&config);
    let _notifier_handle = spawn_notifier(notifier, alerts_rx);

    let _cleanup_handle = spawn_cleanup_task(
        watcher.clone(),
        config.clean_interval(),
        config.clean_bound(),
        cancel_token.clone(),
    );
    info!(
        every_secs = config.clean_interval_secs,
        bound_secs = config.clean_bound_secs,
        "Cleanup task started"
    );

    let server = WatcherServer::bind(&config.listen, watcher, cancel_token).await?;

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Watchdog daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
