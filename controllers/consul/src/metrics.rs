//! Prometheus metrics.

use crate::error::ControllerError;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Outcome label for a successful reconcile.
pub const RESULT_SUCCESS: &str = "success";

/// Outcome label for a failed reconcile.
pub const RESULT_ERROR: &str = "error";

/// Metrics exported on `/metrics`.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconcile_total: IntCounterVec,
    reconcile_duration: HistogramVec,
    deregistrations_total: IntCounter,
}

impl Metrics {
    /// Create the metrics in a fresh registry.
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let reconcile_total = IntCounterVec::new(
            Opts::new(
                "consul_controller_reconcile_total",
                "Reconciles by resource kind and result",
            ),
            &["kind", "result"],
        )?;
        let reconcile_duration = HistogramVec::new(
            HistogramOpts::new(
                "consul_controller_reconcile_duration_seconds",
                "Reconcile latency by resource kind",
            ),
            &["kind"],
        )?;
        let deregistrations_total = IntCounter::new(
            "consul_controller_deregistrations_total",
            "Services observed leaving the Consul catalog",
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(deregistrations_total.clone()))?;

        Ok(Self {
            registry,
            reconcile_total,
            reconcile_duration,
            deregistrations_total,
        })
    }

    /// Record one reconcile of `kind`.
    pub fn record_reconcile(&self, kind: &str, result: &str, elapsed: Duration) {
        self.reconcile_total.with_label_values(&[kind, result]).inc();
        self.reconcile_duration
            .with_label_values(&[kind])
            .observe(elapsed.as_secs_f64());
    }

    /// Record a service leaving the catalog.
    pub fn record_deregistration(&self) {
        self.deregistrations_total.inc();
    }

    /// Text exposition of every metric.
    pub fn encode(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics are not UTF-8: {e}")).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_counters_are_labelled() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reconcile("ServiceDefaults", RESULT_SUCCESS, Duration::from_millis(12));
        metrics.record_reconcile("ServiceDefaults", RESULT_SUCCESS, Duration::from_millis(8));
        metrics.record_reconcile("Registration", RESULT_ERROR, Duration::from_millis(3));
        metrics.record_deregistration();

        let text = metrics.encode().unwrap();
        assert!(text.contains(
            r#"consul_controller_reconcile_total{kind="ServiceDefaults",result="success"} 2"#
        ));
        assert!(text.contains(
            r#"consul_controller_reconcile_total{kind="Registration",result="error"} 1"#
        ));
        assert!(text.contains("consul_controller_deregistrations_total 1"));
        assert!(text.contains(r#"consul_controller_reconcile_duration_seconds_count{kind="ServiceDefaults"} 2"#));
    }
}
