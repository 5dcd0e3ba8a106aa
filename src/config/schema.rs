//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! The core only ever reads it; it is built once at startup (see `cli.rs`).

use std::net::SocketAddr;

/// Fallback listen backlog when the platform maximum cannot be read.
pub const DEFAULT_BACKLOG: u32 = 128;

/// Root configuration for the daemon.
#[derive(Debug, Clone, Default)]
pub struct DaemonConfig {
    /// Where and how to listen.
    pub listener: ListenerConfig,

    /// Load and concurrency limits gating `accept`.
    pub admission: AdmissionConfig,

    /// The command spawned for every connection.
    pub handler: HandlerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Address family preference for the listener set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Family {
    /// Bind every family the address resolves to.
    #[default]
    Any,
    /// IPv4 candidates only.
    Ipv4,
    /// IPv6 candidates only, with dual-stack acceptance disabled.
    Ipv6,
}

impl Family {
    /// Derive the preference from the `--ipv4`/`--ipv6` flags.
    ///
    /// Both set or neither set means no restriction.
    pub fn from_flags(ipv4: bool, ipv6: bool) -> Self {
        match (ipv4, ipv6) {
            (true, false) => Family::Ipv4,
            (false, true) => Family::Ipv6,
            _ => Family::Any,
        }
    }

    /// Whether a resolved candidate passes this preference.
    pub fn admits(&self, addr: &SocketAddr) -> bool {
        match self {
            Family::Any => true,
            Family::Ipv4 => addr.is_ipv4(),
            Family::Ipv6 => addr.is_ipv6(),
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Any => write!(f, "any"),
            Family::Ipv4 => write!(f, "ipv4"),
            Family::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Port to listen on (0 picks an ephemeral port per socket).
    pub port: u16,

    /// Bind address; `None` binds the wildcard address of each family.
    pub address: Option<String>,

    /// Address family preference.
    pub family: Family,

    /// Queue depth for not-yet-accepted connections.
    pub backlog: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            address: None,
            family: Family::Any,
            backlog: DEFAULT_BACKLOG,
        }
    }
}

/// Admission limits.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Only admit a connection while another is outstanding if the
    /// 1-minute load average is below this value.
    pub load_average: Option<f64>,

    /// Maximum concurrent handler processes (0 means unbounded).
    pub max_processes: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            load_average: None,
            max_processes: 1,
        }
    }
}

/// Handler command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Program to execute for each connection.
    pub command: String,

    /// Arguments passed to `command`.
    pub args: Vec<String>,
}

impl HandlerConfig {
    pub fn new(command: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl std::fmt::Display for HandlerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Observability settings.
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    /// Number of `-v` flags given.
    pub verbosity: u8,

    /// Serve Prometheus metrics on this address when set.
    pub metrics_address: Option<SocketAddr>,
}
