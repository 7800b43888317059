//! # Observability Infrastructure
//!
//! Structured logging and metrics for the secret manager, the CA clients and
//! the authenticators. Exporting metrics is left to the embedding process: the
//! counters here are recorded through the `metrics` facade and land in whatever
//! recorder the process installs.

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
pub use metrics::{register_metrics, MetricsRecorder};
