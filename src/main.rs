//! socket-burst-dampener
//!
//! A daemon that spawns a specified command to handle each connection,
//! and dampens connection bursts.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────┐
//!                   │              SOCKET BURST DAMPENER           │
//!                   │                                              │
//!   Client ─────────┼─▶ net::ListenerSet ──▶ admission::Daemon     │
//!                   │    (bind, listen)       (gate, pause/resume) │
//!                   │                               │              │
//!                   │                               ▼              │
//!   Client ◀────────┼─── handler process ◀── process::Supervisor   │
//!   (stdin/stdout)  │                         (spawn, reap)        │
//!                   │                                              │
//!                   │   lifecycle (SIGINT)   observability         │
//!                   └──────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use clap::Parser;

use socket_burst_dampener::config::{Cli, Family};
use socket_burst_dampener::lifecycle::signals::{self, Outcome};
use socket_burst_dampener::net::platform;
use socket_burst_dampener::observability::{logging, metrics};
use socket_burst_dampener::{Daemon, Shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Cli::parse().into_config();

    logging::init_logging(config.observability.verbosity);
    tracing::info!("socket-burst-dampener v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::debug!(config = ?config, "Configuration loaded");

    if config.listener.family == Family::Ipv6 && !platform::has_ipv6() {
        tracing::warn!("IPv6 requested but this platform does not support it");
    }

    // Installed before binding, so an interrupt during startup is not lost.
    let mut interrupts = match signals::Interrupts::new() {
        Ok(interrupts) => interrupts,
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for interrupt");
            return ExitCode::FAILURE;
        }
    };

    if let Some(addr) = config.observability.metrics_address {
        if let Err(e) = metrics::init_metrics(addr) {
            tracing::error!(metrics_address = %addr, error = %e, "Failed to start metrics endpoint");
            return ExitCode::FAILURE;
        }
    }

    let daemon = match Daemon::bind(&config) {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let run = daemon.run(shutdown.subscribe());

    match signals::drive(run, &shutdown, &mut interrupts).await {
        Outcome::Completed(Ok(summary)) => {
            tracing::info!(
                listeners_closed = summary.listeners_closed,
                processes_terminated = summary.processes_terminated,
                accept_errors = summary.accept_errors,
                "Exited cleanly"
            );
            ExitCode::SUCCESS
        }
        Outcome::Completed(Err(e)) => {
            tracing::error!(error = %e, "Daemon failed");
            ExitCode::FAILURE
        }
        Outcome::ShutdownInterrupted => {
            tracing::error!("Shutdown interrupted, remaining handler processes killed");
            ExitCode::from(130)
        }
    }
}
