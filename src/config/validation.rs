//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (clap handles syntactic)
//! - Validate value ranges (load ceiling > 0, backlog > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DaemonConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is handed to the daemon

use thiserror::Error;

use crate::config::schema::DaemonConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("handler command must not be empty")]
    EmptyCommand,

    #[error("load average ceiling must be a positive number, got {0}")]
    InvalidLoadAverage(f64),

    #[error("listen backlog must be greater than zero")]
    ZeroBacklog,
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &DaemonConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.handler.command.trim().is_empty() {
        errors.push(ValidationError::EmptyCommand);
    }

    if let Some(load) = config.admission.load_average {
        if !load.is_finite() || load <= 0.0 {
            errors.push(ValidationError::InvalidLoadAverage(load));
        }
    }

    if config.listener.backlog == 0 {
        errors.push(ValidationError::ZeroBacklog);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
