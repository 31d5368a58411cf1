//! Watchdog Clerk - keep-alive client
//!
//! Registers with a watcher and pings it until interrupted. On SIGINT or
//! SIGTERM it logs out so the watcher does not raise an alert.
//!
//! # Usage
//!
//! ```bash
//! # Ping every 2s, alert after 5s of silence
//! watchdog 10.0.0.1:7070 db-1 --timeout 5s --interval 2s
//!
//! # Take the watcher address from the environment
//! WATCHDOG_ADDR=10.0.0.1:7070 watchdog db-1
//! ```

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use watchdog_clerk::{Clerk, ClerkConfig, TcpTransport};
use watchdog_core::parse_duration;

/// Watcher address used when none is given on the command line
const ADDR_ENV: &str = "WATCHDOG_ADDR";

/// Keep-alive client for the watchdog liveness monitor
#[derive(Parser, Debug)]
#[command(name = "watchdog", version, about)]
struct Args {
    /// [ADDR] NAME - watcher address (default: $WATCHDOG_ADDR) and client name
    #[arg(num_args = 1..=2, required = true, value_names = ["ADDR", "NAME"])]
    target: Vec<String>,

    /// Silence the watcher tolerates before alerting (e.g. 500ms, 5s, 1m)
    #[arg(short, long, default_value = "10s", value_parser = parse_duration_arg)]
    timeout: Duration,

    /// Time between pings; must be shorter than the timeout
    #[arg(short, long, default_value = "5s", value_parser = parse_duration_arg)]
    interval: Duration,
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

/// Splits the positional arguments into address and name.
fn resolve_target(target: &[String], env_addr: Option<String>) -> Result<(String, String)> {
    match target {
        [addr, name] => Ok((addr.clone(), name.clone())),
        [name] => {
            let addr = env_addr
                .with_context(|| format!("No watcher address given and {ADDR_ENV} is not set"))?;
            Ok((addr, name.clone()))
        }
        _ => bail!("Expected [ADDR] NAME"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (addr, name) = resolve_target(&args.target, env::var(ADDR_ENV).ok())?;
    if args.interval >= args.timeout {
        bail!(
            "--interval ({:?}) must be shorter than --timeout ({:?})",
            args.interval,
            args.timeout
        );
    }

    run(addr, ClerkConfig::new(name, args.timeout, args.interval))
}

#[tokio::main]
async fn run(addr: String, config: ClerkConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("watchdog=info".parse()?)
                .add_directive("watchdog_clerk=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        name = %config.name,
        "Watchdog clerk starting"
    );

    let clerk = Arc::new(Clerk::new(config, TcpTransport::new(addr)));

    let runner = Arc::clone(&clerk);
    let keep_alive = tokio::spawn(async move { runner.keep_alive().await });

    if let Err(e) = wait_for_shutdown_signal().await {
        error!(error = %e, "Error waiting for shutdown signal");
    }
    info!("Shutdown signal received, logging out");

    clerk.logout().await;
    keep_alive.await.context("Keep-alive task failed")?;

    info!("Watchdog clerk stopped");
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

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_explicit_address() {
        let (addr, name) =
            resolve_target(&strings(&["10.0.0.1:7070", "db-1"]), Some("ignored".into())).unwrap();
        assert_eq!(addr, "10.0.0.1:7070");
        assert_eq!(name, "db-1");
    }

    #[test]
    fn test_resolve_address_from_env() {
        let (addr, name) = resolve_target(&strings(&["db-1"]), Some("10.0.0.2:7070".into())).unwrap();
        assert_eq!(addr, "10.0.0.2:7070");
        assert_eq!(name, "db-1");
    }

    #[test]
    fn test_resolve_without_address_fails() {
        assert!(resolve_target(&strings(&["db-1"]), None).is_err());
    }

    #[test]
    fn test_cli_parses_durations() {
        let args = Args::try_parse_from([
            "watchdog",
            "127.0.0.1:7070",
            "db-1",
            "--timeout",
            "1m",
            "--interval",
            "500ms",
        ])
        .unwrap();
        assert_eq!(args.timeout, Duration::from_secs(60));
        assert_eq!(args.interval, Duration::from_millis(500));
    }

    #[test]
    fn test_cli_rejects_bad_duration() {
        assert!(Args::try_parse_from(["watchdog", "db-1", "--timeout", "soon"]).is_err());
    }
}
