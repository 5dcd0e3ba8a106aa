//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! net, process, admission produce:
//!     → logging.rs (structured log events on stderr)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → operator terminal / journal
//!     → Prometheus scrape (optional)
//! ```

pub mod logging;
pub mod metrics;
