//! Prometheus metrics for rounds, loops and model requests.
//!
//! # Example
//!
//! ```ignore
//! use codeloop::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! MetricsCollector::new().record_round("success", Some(0.4));
//! println!("{}", export_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    EXECUTION_DURATION, LLM_LATENCY, LLM_REQUESTS_TOTAL, LOOPS_TOTAL, REGISTRY, ROUNDS_TOTAL,
};
