//! Prometheus metrics and structured logging for volwatch.
//!
//! - Prometheus metrics for window volume, alerts, source errors and the
//!   stream connection
//! - Structured logging with tracing (pretty locally, JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
