//! gpucool daemon (gpucoold)
//!
//! Privileged daemon keeping GPU cooling parameters inside user-configured
//! bounds. Reads a TOML config file, matches its sections to discovered
//! amdgpu devices, and runs a per-second fan curve per managed device.
//!
//! # State Restoration
//!
//! Every hardware file the daemon touches is recorded first and restored on
//! the way out: on SIGINT/SIGTERM, and before the system suspends. Suspend
//! hooks deliver sleep/wake over SIGUSR1 (entering sleep) and SIGUSR2
//! (resumed), e.g. from a systemd sleep hook unit.

mod suspend;
mod update_cycle;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use suspend::SuspendCoordinator;
use update_cycle::{CancelToken, CycleSettings};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    eprintln!("gpucoold {} - GPU cooling control daemon", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    gpucoold [OPTIONS] CONFIG");
    eprintln!();
    eprintln!("ARGS:");
    eprintln!("    CONFIG              Path to the TOML configuration file");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    GPUCOOL_LOG         Log level (trace, debug, info, warn, error)");
    eprintln!();
    eprintln!("SIGNALS:");
    eprintln!("    SIGINT/SIGTERM      Restore hardware state and exit");
    eprintln!("    SIGUSR1             System entering sleep (restore state)");
    eprintln!("    SIGUSR2             System resumed (restart control)");
}

fn print_version() {
    println!("gpucoold {}", VERSION);
}

/// Initialize logging to the systemd journal when available, stdout otherwise
fn init_logging() {
    let log_level = std::env::var("GPUCOOL_LOG").unwrap_or_else(|_| "info".to_string());

    if Path::new("/run/systemd/journal/socket").exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(&log_level))
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(&log_level)
        .init();
}

fn verify_privileges() {
    // SAFETY: geteuid is always safe - it just returns the process's effective user ID.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!(
            "Running as uid {} - hardware writes will likely be rejected (run as root)",
            euid
        );
    }
}

/// Wire unix signals into the shutdown token and the sleep/wake channel
fn spawn_signal_listeners(
    shutdown: CancelToken,
    sleep_events: mpsc::Sender<bool>,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("SIGNAL: Received SIGINT - initiating shutdown"),
            _ = sigterm.recv() => info!("SIGNAL: Received SIGTERM - initiating shutdown"),
        }
        shutdown.cancel();
    });

    let mut sigusr1 = signal(SignalKind::user_defined1()).context("installing SIGUSR1 handler")?;
    let mut sigusr2 = signal(SignalKind::user_defined2()).context("installing SIGUSR2 handler")?;
    tokio::spawn(async move {
        loop {
            let entering_sleep = tokio::select! {
                _ = sigusr1.recv() => true,
                _ = sigusr2.recv() => false,
            };
            if sleep_events.send(entering_sleep).await.is_err() {
                break;
            }
        }
    });

    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // PHASE 1: Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                print_version();
                return Ok(());
            }
            arg if !arg.starts_with('-') => {
                config_path = Some(PathBuf::from(arg));
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let Some(config_path) = config_path else {
        eprintln!("Error: no configuration file given");
        print_help();
        std::process::exit(1);
    };

    // PHASE 2: Logging and privilege check
    init_logging();
    info!("STARTUP: gpucoold {} starting", VERSION);
    info!("STARTUP: PID: {}", std::process::id());
    verify_privileges();

    // PHASE 3: Load configuration - the only unrecoverable failure
    let configs = match gpc_core::load_config(&config_path) {
        Ok(configs) => Arc::new(configs),
        Err(e) => {
            error!("Cannot load configuration {:?}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    // PHASE 4: Signal wiring
    let shutdown = CancelToken::new();
    let (sleep_tx, sleep_rx) = mpsc::channel(8);
    spawn_signal_listeners(shutdown.clone(), sleep_tx)?;

    // PHASE 5: Run until shutdown; restoration happens inside
    let coordinator = SuspendCoordinator::new(
        config_path,
        configs,
        CycleSettings::default(),
        sleep_rx,
        shutdown,
    );
    coordinator.run().await;

    info!("SHUTDOWN: gpucoold terminated gracefully");
    Ok(())
}
