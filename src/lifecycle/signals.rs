//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for the operator interrupt (SIGINT)
//! - Turn the first interrupt into a graceful shutdown
//! - Report a second interrupt as an interrupted shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - One SIGINT stream lives for the whole run, so an interrupt arriving
//!   between two waits is buffered rather than dropped
//! - Only SIGINT is recognized; other signals keep their default action

use std::future::Future;
use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::lifecycle::Shutdown;

/// How a driven future ended.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The future ran to completion (possibly after a graceful shutdown).
    Completed(T),
    /// A second interrupt arrived while shutdown was still draining.
    ShutdownInterrupted,
}

/// The operator interrupt stream.
#[derive(Debug)]
pub struct Interrupts {
    inner: Signal,
}

impl Interrupts {
    /// Start listening for SIGINT. Must be called from within a Tokio runtime.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inner: signal(SignalKind::interrupt())?,
        })
    }

    /// Wait for the next interrupt, including one delivered since the last wait.
    pub async fn recv(&mut self) {
        if self.inner.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

/// Drive `work` to completion, converting the first interrupt into a
/// shutdown trigger.
///
/// On a second interrupt `work` is dropped unfinished.
pub async fn drive<F: Future>(work: F, shutdown: &Shutdown, interrupts: &mut Interrupts) -> Outcome<F::Output> {
    tokio::pin!(work);

    tokio::select! {
        output = &mut work => return Outcome::Completed(output),
        () = interrupts.recv() => {
            tracing::info!("Interrupt received, shutting down");
            shutdown.trigger();
        }
    }

    tokio::select! {
        output = &mut work => Outcome::Completed(output),
        () = interrupts.recv() => Outcome::ShutdownInterrupted,
    }
}
