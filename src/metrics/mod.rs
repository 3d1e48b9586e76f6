//! Metrics module for Prometheus-based monitoring.
//!
//! Tracks generator attempts, phase durations, item outcomes, circuit
//! breaker trips, artifact writes and queue depth.
//!
//! # Example
//!
//! ```ignore
//! use note_forge::metrics::{export_metrics, init_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run the scheduler ...
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{ArtifactTarget, MetricsCollector, Phase};
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ARTIFACTS_TOTAL, CIRCUIT_TRIPS_TOTAL, ITEMS_TOTAL, PHASE_ATTEMPTS_TOTAL, PHASE_DURATION,
    PROCESSING, QUEUE_DEPTH, REGISTRY,
};
