//! Command-line surface.
//!
//! Parses the operator's arguments with clap and converts them into a
//! [`DaemonConfig`]. The listen backlog is not a flag; it is read from
//! the platform when the config is built.

use std::net::SocketAddr;

use clap::{ArgAction, Parser};

use crate::config::schema::{
    AdmissionConfig, DaemonConfig, Family, HandlerConfig, ListenerConfig, ObservabilityConfig,
};
use crate::net::platform;

#[derive(Debug, Parser)]
#[command(name = "socket-burst-dampener")]
#[command(
    version,
    about = "A daemon that spawns a specified command to handle each connection, and dampens connection bursts"
)]
pub struct Cli {
    /// Listen on the given port number
    #[arg(value_name = "PORT")]
    pub port: u16,

    /// Bind to the specified address
    #[arg(long, value_name = "ADDRESS")]
    pub address: Option<String>,

    /// Prefer IPv4
    #[arg(long)]
    pub ipv4: bool,

    /// Prefer IPv6
    #[arg(long)]
    pub ipv6: bool,

    /// Don't accept multiple connections unless load is below LOAD
    #[arg(long = "load-average", value_name = "LOAD")]
    pub load_average: Option<f64>,

    /// Maximum number of concurrent processes (0 means infinite)
    #[arg(long, value_name = "PROCESSES", default_value_t = 1)]
    pub processes: usize,

    /// Serve Prometheus metrics on this address
    #[arg(long = "metrics-address", value_name = "ADDR")]
    pub metrics_address: Option<SocketAddr>,

    /// Verbose logging (each occurrence increases verbosity)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Command to spawn to handle each connection
    #[arg(value_name = "CMD")]
    pub cmd: String,

    /// Argument(s) for CMD
    #[arg(value_name = "ARG", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Build the daemon configuration, sourcing the backlog from the platform.
    pub fn into_config(self) -> DaemonConfig {
        self.into_config_with_backlog(platform::system_backlog())
    }

    pub fn into_config_with_backlog(self, backlog: u32) -> DaemonConfig {
        DaemonConfig {
            listener: ListenerConfig {
                port: self.port,
                address: self.address.filter(|a| !a.is_empty()),
                family: Family::from_flags(self.ipv4, self.ipv6),
                backlog,
            },
            admission: AdmissionConfig {
                load_average: self.load_average,
                max_processes: self.processes,
            },
            handler: HandlerConfig {
                command: self.cmd,
                args: self.args,
            },
            observability: ObservabilityConfig {
                verbosity: self.verbose,
                metrics_address: self.metrics_address,
            },
        }
    }
}
