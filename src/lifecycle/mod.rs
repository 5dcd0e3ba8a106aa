//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse CLI → Validate → Bind listeners → Start accepting
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Close listeners → Terminate handlers
//!
//! Signals (signals.rs):
//!     SIGINT → Trigger graceful shutdown
//!     SIGINT again → Report interrupted shutdown, exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, close, drain handlers
//! - Handler drain has no deadline; a second interrupt is the escape hatch

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
