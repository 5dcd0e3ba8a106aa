//! Admission gate: load average and concurrency checks.

use std::fmt;
use std::sync::Arc;

use crate::config::AdmissionConfig;
use crate::net::platform;

/// Source of the 1-minute load average.
pub trait LoadSource: Send + Sync {
    /// Current 1-minute load average, or `None` when unavailable.
    fn one_minute(&self) -> Option<f64>;
}

/// Reads the load average from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoad;

impl LoadSource for SystemLoad {
    fn one_minute(&self) -> Option<f64> {
        platform::load_average()
    }
}

/// Decides whether another connection may be admitted.
#[derive(Clone)]
pub struct AdmissionGate {
    ceiling: Option<f64>,
    max_processes: usize,
    load: Arc<dyn LoadSource>,
}

impl AdmissionGate {
    pub fn new(config: &AdmissionConfig, load: Arc<dyn LoadSource>) -> Self {
        Self {
            ceiling: config.load_average,
            max_processes: config.max_processes,
            load,
        }
    }

    /// Whether load allows admitting a connection with `live` handlers running.
    ///
    /// An empty table always admits, so the daemon cannot wedge itself
    /// under sustained load. An unreadable load average does not gate.
    pub fn acceptable_load(&self, live: usize) -> bool {
        let Some(ceiling) = self.ceiling else {
            return true;
        };
        if live == 0 {
            return true;
        }
        match self.load.one_minute() {
            Some(load) => load < ceiling,
            None => true,
        }
    }

    /// Whether `live` handlers fill the configured limit. Never true when unbounded.
    pub fn at_capacity(&self, live: usize) -> bool {
        self.max_processes != 0 && live >= self.max_processes
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("ceiling", &self.ceiling)
            .field("max_processes", &self.max_processes)
            .finish_non_exhaustive()
    }
}
