//! Process supervision subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection
//!     → supervisor.rs spawn (connection → stdin/stdout, pid → table)
//!     → SIGCHLD → reap sweep (pid removed, controller re-evaluates)
//!     → shutdown (SIGTERM + wait for every remaining pid)
//! ```

pub mod supervisor;

pub use supervisor::{HandlerProcess, SpawnError, Supervisor, SupervisorError};
