//! Prometheus metrics and structured logging for the kq quoting bot.
//!
//! - Structured logging with `tracing` (JSON in production)
//! - Prometheus gauges/counters for quote states, crossed quotes, zombies,
//!   fair value, safety ratios and target position

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
