//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! argv
//!     → cli.rs (clap parse, flags → typed values)
//!     → schema.rs (DaemonConfig with defaults)
//!     → validation.rs (semantic checks)
//!     → DaemonConfig (validated, read-only to the core)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once built; the daemon never reloads it
//! - All fields have defaults to allow minimal configs in tests
//! - Validation separates syntactic (clap) from semantic checks

pub mod cli;
pub mod schema;
pub mod validation;

pub use cli::Cli;
pub use schema::{AdmissionConfig, DaemonConfig, Family, HandlerConfig, ListenerConfig, ObservabilityConfig};
pub use validation::{validate_config, ValidationError};
