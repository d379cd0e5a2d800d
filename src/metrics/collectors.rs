//! Recording helpers for codeloop operations.
//!
//! [`MetricsCollector`] wraps the raw Prometheus statics so call sites do not
//! deal with labels or initialization state. Every method is a no-op until
//! [`super::init_metrics`] has run.

use super::prometheus::{
    EXECUTION_DURATION, LLM_LATENCY, LLM_REQUESTS_TOTAL, LOOPS_TOTAL, ROUNDS_TOTAL,
};

/// Metrics collector for recording codeloop operational metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record one round.
    ///
    /// # Arguments
    ///
    /// * `outcome` - `"success"` or the fault category label
    /// * `duration_secs` - Time spent executing the candidate, if it ran
    pub fn record_round(&self, outcome: &str, duration_secs: Option<f64>) {
        if let Some(rounds) = ROUNDS_TOTAL.get() {
            rounds.with_label_values(&[outcome]).inc();
        }

        if let (Some(histogram), Some(secs)) = (EXECUTION_DURATION.get(), duration_secs) {
            histogram.with_label_values(&[outcome]).observe(secs);
        }

        tracing::trace!(outcome = outcome, duration_secs = ?duration_secs, "Recorded round metric");
    }

    /// Record the final status of a debug loop.
    pub fn record_loop(&self, status: &str) {
        if let Some(loops) = LOOPS_TOTAL.get() {
            loops.with_label_values(&[status]).inc();
        }

        tracing::trace!(status = status, "Recorded loop metric");
    }

    /// Record an LLM API request.
    pub fn record_llm_request(&self, success: bool, latency_secs: f64) {
        let status = if success { "success" } else { "failure" };

        if let Some(requests) = LLM_REQUESTS_TOTAL.get() {
            requests.with_label_values(&[status]).inc();
        }

        if let Some(latency) = LLM_LATENCY.get() {
            latency.with_label_values(&[status]).observe(latency_secs);
        }

        tracing::trace!(
            status = status,
            latency_secs = latency_secs,
            "Recorded LLM request metric"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_recording_before_init_is_noop() {
        // Must not panic regardless of registry state.
        let collector = MetricsCollector::new();
        collector.record_round("timeout", Some(1.0));
        collector.record_loop("gave_up");
        collector.record_llm_request(false, 0.2);
    }

    #[test]
    fn test_recorded_values_are_exported() {
        let _ = init_metrics();
        let collector = MetricsCollector::new();
        collector.record_round("forbidden_call", Some(0.1));
        collector.record_loop("succeeded");
        collector.record_llm_request(true, 1.5);

        let text = export_metrics();
        assert!(text.contains("codeloop_loops_total"));
        assert!(text.contains("forbidden_call"));
        assert!(text.contains("codeloop_llm_requests_total"));
    }
}
