//! The admission controller: a single-task reactor.
//!
//! # Responsibilities
//! - Own the listener set and the process supervisor
//! - Accept one connection per readiness event while admission allows
//! - Pause when the process limit is reached or load is too high
//! - Resume after a reap once load allows it again
//! - Close listeners and drain handlers on shutdown
//!
//! # Design Decisions
//! - All state lives on one task; events are handled strictly in
//!   sequence, so the table size seen by the gate is never stale
//! - Shutdown and child exits are polled before readiness, so no spawn
//!   happens after a shutdown trigger has been observed
//! - A paused controller simply stops polling listener readiness; the
//!   kernel backlog holds pending connections until it resumes

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::admission::gate::{AdmissionGate, LoadSource, SystemLoad};
use crate::admission::state::AdmissionState;
use crate::config::{validate_config, DaemonConfig, ValidationError};
use crate::lifecycle::ShutdownSignal;
use crate::net::{ListenerError, ListenerSet};
use crate::observability::metrics;
use crate::process::{Supervisor, SupervisorError};

/// Fatal daemon errors. Per-connection failures never surface here.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("invalid configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ValidationError>),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("listener readiness failed: {0}")]
    Reactor(#[source] io::Error),
}

/// Pause after a failed accept before polling readiness again.
///
/// Errors such as `EMFILE` leave the connection queued and the socket
/// readable; retrying immediately would spin until a descriptor frees up.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// What shutdown released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSummary {
    pub listeners_closed: usize,
    pub processes_terminated: usize,
    /// Accepts that failed over the daemon's lifetime.
    pub accept_errors: u64,
}

/// The daemon: listener set, process table and admission state.
#[derive(Debug)]
pub struct Daemon {
    listeners: ListenerSet,
    supervisor: Supervisor,
    gate: AdmissionGate,
    state: AdmissionState,
    accept_errors: u64,
}

impl Daemon {
    /// Validate the configuration and bind every listener.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(config: &DaemonConfig) -> Result<Self, DaemonError> {
        Self::bind_with_load(config, Arc::new(SystemLoad))
    }

    /// Like [`Daemon::bind`], reading load from `load`.
    pub fn bind_with_load(config: &DaemonConfig, load: Arc<dyn LoadSource>) -> Result<Self, DaemonError> {
        validate_config(config).map_err(DaemonError::InvalidConfig)?;

        // Exit notifications are installed before any child can exist.
        let supervisor = Supervisor::new(config.handler.clone())?;
        let listeners = ListenerSet::bind(&config.listener)?;

        tracing::info!(
            listeners = listeners.len(),
            max_processes = config.admission.max_processes,
            load_average = ?config.admission.load_average,
            command = %config.handler,
            "Daemon ready"
        );

        Ok(Self {
            listeners,
            supervisor,
            gate: AdmissionGate::new(&config.admission, load),
            state: AdmissionState::NotStarted,
            accept_errors: 0,
        })
    }

    /// Address of the first bound listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listeners.local_addr()
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.local_addrs()
    }

    pub fn state(&self) -> AdmissionState {
        self.state
    }

    pub fn live_processes(&self) -> usize {
        self.supervisor.len()
    }

    /// Serve until `shutdown` fires, then close listeners and drain handlers.
    ///
    /// Shutdown runs exactly once, also when the reactor fails.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Result<ShutdownSummary, DaemonError> {
        if self.state.start() {
            tracing::info!(addresses = ?self.listeners.local_addrs(), "Accepting connections");
        }

        let served = self.serve(&mut shutdown).await;
        if let Err(e) = &served {
            tracing::error!(error = %e, "Reactor failed, shutting down");
        }

        let summary = self.shutdown().await;
        served.map(|()| summary)
    }

    async fn serve(&mut self, shutdown: &mut ShutdownSignal) -> Result<(), DaemonError> {
        loop {
            let accepting = self.state.is_accepting();
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown requested");
                    return Ok(());
                }
                _ = self.supervisor.exited() => self.reap_children(),
                ready = self.listeners.readable(), if accepting => {
                    let index = ready.map_err(DaemonError::Reactor)?;
                    self.on_readable(index).await;
                }
            }
        }
    }

    /// One readiness event on listener `index`.
    async fn on_readable(&mut self, index: usize) {
        if !self.state.is_accepting() {
            tracing::trace!(state = %self.state, "Readiness while not accepting, ignored");
            return;
        }

        if !self.gate.acceptable_load(self.supervisor.len()) {
            self.pause("load");
            return;
        }

        let (stream, peer) = match self.listeners.try_accept(index).await {
            Some(Ok(conn)) => conn,
            Some(Err(e)) => {
                self.accept_errors += 1;
                tracing::debug!(error = %e, failures = self.accept_errors, "Accept failed, backing off");
                metrics::record_accept_error();
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                return;
            }
            None => {
                tracing::trace!("Spurious readiness, nothing to accept");
                return;
            }
        };
        metrics::record_accepted();

        match self.supervisor.spawn(stream, peer) {
            Ok(pid) => tracing::info!(
                pid,
                peer = %peer,
                live = self.supervisor.len(),
                "Connection handed to handler"
            ),
            Err(e) => {
                tracing::error!(peer = %peer, error = %e, "Failed to spawn handler, connection dropped");
                metrics::record_spawn_failure();
            }
        }
        metrics::set_live_processes(self.supervisor.len());

        if self.gate.at_capacity(self.supervisor.len()) {
            self.pause("process-limit");
        }
    }

    fn reap_children(&mut self) {
        while let Some(pid) = self.supervisor.reap() {
            metrics::record_reaped();
            self.on_exit(pid);
        }
        metrics::set_live_processes(self.supervisor.len());
    }

    fn on_exit(&mut self, pid: u32) {
        tracing::debug!(pid, live = self.supervisor.len(), "Handler process reaped");
        if self.state == AdmissionState::Paused && self.gate.acceptable_load(self.supervisor.len()) {
            self.resume();
        }
    }

    fn pause(&mut self, reason: &'static str) {
        if self.state.pause() {
            tracing::info!(reason, live = self.supervisor.len(), "Paused accepting");
            metrics::record_paused(reason);
        }
    }

    fn resume(&mut self) {
        if self.state.resume() {
            tracing::info!(live = self.supervisor.len(), "Resumed accepting");
        }
    }

    async fn shutdown(&mut self) -> ShutdownSummary {
        let previous = self.state;
        self.state.begin_shutdown();
        tracing::info!(
            previous_state = %previous,
            live = self.supervisor.len(),
            "Shutting down"
        );

        let listeners_closed = self.listeners.close();
        let processes_terminated = self.supervisor.shutdown().await;
        metrics::set_live_processes(0);

        tracing::info!(
            listeners_closed,
            processes_terminated,
            accept_errors = self.accept_errors,
            "Shutdown complete"
        );
        ShutdownSummary {
            listeners_closed,
            processes_terminated,
            accept_errors: self.accept_errors,
        }
    }
}
