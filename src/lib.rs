//! Socket burst dampener library.
//!
//! Listens on one or more sockets and spawns a handler command for every
//! accepted connection, with the connection as the handler's stdin and
//! stdout. Bursts are dampened by pausing `accept` while the handler
//! count is at its limit or the load average is above a ceiling.

pub mod admission;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod process;

pub use admission::{Daemon, DaemonError, ShutdownSummary};
pub use config::DaemonConfig;
pub use lifecycle::Shutdown;
