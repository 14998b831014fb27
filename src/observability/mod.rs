//! Connection counters
//!
//! Logging goes through `tracing` at the call sites; this module only
//! holds the counters a connection exposes through `Connection::metrics`.

mod metrics;

pub use metrics::{MetricsRegistry, MetricsSnapshot};
