//! Prometheus metrics for the reconcile loop.

use std::time::Duration;

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{ControllerError, ErrorClass};

/// Outcome label values
pub mod outcomes {
    pub const SUCCESS: &str = "success";
    pub const REQUEUE: &str = "requeue";
    pub const ERROR: &str = "error";
    pub const TIMEOUT: &str = "timeout";
}

/// Reconcile loop metrics, registered in a private registry
pub struct Metrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    failures: IntCounterVec,
    duration: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, ControllerError> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new("hostedcluster_reconciliations_total", "HostedCluster reconcile passes by outcome"),
            &["outcome"],
        )
        .map_err(metrics_error)?;
        let failures = IntCounterVec::new(
            Opts::new("hostedcluster_reconcile_errors_total", "Failed reconcile passes by error class"),
            &["class"],
        )
        .map_err(metrics_error)?;
        let duration = Histogram::with_opts(
            HistogramOpts::new("hostedcluster_reconcile_duration_seconds", "Duration of a reconcile pass")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(reconciliations.clone())).map_err(metrics_error)?;
        registry.register(Box::new(failures.clone())).map_err(metrics_error)?;
        registry.register(Box::new(duration.clone())).map_err(metrics_error)?;

        Ok(Self {
            registry,
            reconciliations,
            failures,
            duration,
        })
    }

    /// Count a finished pass
    pub fn observe(&self, outcome: &str, elapsed: Duration) {
        self.reconciliations.with_label_values(&[outcome]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    /// Count a failed pass by class
    pub fn observe_failure(&self, class: ErrorClass) {
        let class = match class {
            ErrorClass::Transient => "transient",
            ErrorClass::Configuration => "configuration",
            ErrorClass::Fatal => "fatal",
        };
        self.failures.with_label_values(&[class]).inc();
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| ControllerError::Server(format!("metrics are not utf-8: {e}")))
    }
}

fn metrics_error(e: prometheus::Error) -> ControllerError {
    ControllerError::Server(format!("metrics: {e}"))
}
