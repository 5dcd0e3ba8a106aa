//! Admission control subsystem.
//!
//! # Data Flow
//! ```text
//! listener readable ─▶ gate.rs (load, capacity) ─▶ accept ─▶ spawn
//!                                                    │
//!                          state.rs (pause/resume) ◀─┘
//! child exit ─▶ reap ─▶ gate.rs ─▶ state.rs (resume)
//! ```
//!
//! # Design Decisions
//! - The gate is a pure decision over (table size, load reading)
//! - The state machine's transitions are idempotent
//! - controller.rs is the only place either is mutated

pub mod controller;
pub mod gate;
pub mod state;

pub use controller::{Daemon, DaemonError, ShutdownSummary};
pub use gate::{AdmissionGate, LoadSource, SystemLoad};
pub use state::AdmissionState;
