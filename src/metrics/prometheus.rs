//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by codeloop and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{CounterVec, Encoder, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all codeloop metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total rounds executed, labeled by outcome (`success` or a fault category).
pub static ROUNDS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Candidate execution duration in seconds, labeled by outcome.
pub static EXECUTION_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Total debug loops run, labeled by final status.
pub static LOOPS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Total LLM API requests, labeled by status.
pub static LLM_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// LLM API request latency in seconds.
pub static LLM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Recording helpers are no-ops until this runs.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Round metrics
    let rounds_total = CounterVec::new(
        Opts::new("codeloop_rounds_total", "Total number of rounds executed"),
        &["outcome"],
    )?;

    let execution_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "codeloop_execution_duration_seconds",
            "Candidate execution duration in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["outcome"],
    )?;

    // Loop metrics
    let loops_total = CounterVec::new(
        Opts::new("codeloop_loops_total", "Total debug loops run"),
        &["status"],
    )?;

    // LLM metrics
    let llm_requests_total = CounterVec::new(
        Opts::new("codeloop_llm_requests_total", "Total LLM API requests"),
        &["status"],
    )?;

    let llm_latency = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "codeloop_llm_latency_seconds",
            "LLM API request latency in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["status"],
    )?;

    registry.register(Box::new(rounds_total.clone()))?;
    registry.register(Box::new(execution_duration.clone()))?;
    registry.register(Box::new(loops_total.clone()))?;
    registry.register(Box::new(llm_requests_total.clone()))?;
    registry.register(Box::new(llm_latency.clone()))?;

    // If any of these fail, metrics were already initialized (idempotent)
    let _ = REGISTRY.set(registry);
    let _ = ROUNDS_TOTAL.set(rounds_total);
    let _ = EXECUTION_DURATION.set(execution_duration);
    let _ = LOOPS_TOTAL.set(loops_total);
    let _ = LLM_REQUESTS_TOTAL.set(llm_requests_total);
    let _ = LLM_LATENCY.set(llm_latency);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        let result = init_metrics();
        // First call should succeed or metrics already initialized
        assert!(result.is_ok() || REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_metrics_never_empty() {
        let metrics = export_metrics();
        assert!(!metrics.is_empty());
    }

    #[test]
    fn test_metrics_after_init() {
        let _ = init_metrics();

        if let Some(rounds) = ROUNDS_TOTAL.get() {
            rounds.with_label_values(&["success"]).inc();
        }

        let metrics = export_metrics();
        assert!(!metrics.starts_with("# Error"));
        if REGISTRY.get().is_some() {
            assert!(metrics.contains("codeloop_rounds_total"));
        }
    }
}
