//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig
//!     → listener.rs (resolve, dual-stack reconciliation, bind + listen)
//!     → platform.rs (IPv6 availability, bindv6only, somaxconn)
//!     → ListenerSet handed to the admission controller
//! ```
//!
//! # Design Decisions
//! - Per-candidate failures are non-fatal; an empty set is fatal
//! - Platform probes are advisory and never fail startup

pub mod listener;
pub mod platform;

pub use listener::{AddressFamily, ListenerError, ListenerSet, ListenerSocket};
