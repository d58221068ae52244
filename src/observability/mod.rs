//! Observability subsystem.
//!
//! # Responsibilities
//! - Structured logging via `tracing` (initialized in `main`)
//! - Prometheus metrics exposition
//!
//! # Design Decisions
//! - Metric updates are fire-and-forget counters; nothing on the request
//!   path blocks on the exporter

pub mod metrics;
