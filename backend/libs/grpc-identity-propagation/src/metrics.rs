//! Propagation and authentication metrics
//!
//! Interceptors report through [`MetricsCollector`]; the default collector
//! drops everything. Identity URIs and request IDs are high-cardinality, so
//! the Prometheus collector never uses them as labels.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

pub trait MetricsCollector: Send + Sync {
    fn record_propagation_success(&self, method: &str, request_id: &str);
    fn record_propagation_failure(&self, method: &str, reason: &str);
    fn record_extraction_success(&self, method: &str, request_id: &str);
    fn record_call_chain_depth(&self, depth: usize);
    fn record_circular_call_detected(&self, identity: &str);
    /// `result` is `success`, `skipped`, or a failure label
    fn record_authentication(&self, result: &str);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetricsCollector;

impl MetricsCollector for NoopMetricsCollector {
    fn record_propagation_success(&self, _method: &str, _request_id: &str) {}
    fn record_propagation_failure(&self, _method: &str, _reason: &str) {}
    fn record_extraction_success(&self, _method: &str, _request_id: &str) {}
    fn record_call_chain_depth(&self, _depth: usize) {}
    fn record_circular_call_detected(&self, _identity: &str) {}
    fn record_authentication(&self, _result: &str) {}
}

/// Prometheus-backed collector registered into a caller-owned [`Registry`]
#[derive(Clone)]
pub struct PrometheusMetricsCollector {
    propagation: IntCounterVec,
    extraction: IntCounterVec,
    call_chain_depth: Histogram,
    circular_calls: IntCounter,
    authentication: IntCounterVec,
}

impl PrometheusMetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let propagation = IntCounterVec::new(
            Opts::new(
                "ephemos_identity_propagation_total",
                "Outbound identity propagation attempts",
            ),
            &["method", "result", "reason"],
        )?;
        let extraction = IntCounterVec::new(
            Opts::new(
                "ephemos_identity_extraction_total",
                "Inbound requests carrying propagated identity",
            ),
            &["method"],
        )?;
        let call_chain_depth = Histogram::with_opts(
            HistogramOpts::new(
                "ephemos_call_chain_depth",
                "Length of outbound call chains",
            )
            .buckets(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 8.0, 10.0, 15.0, 20.0]),
        )?;
        let circular_calls = IntCounter::new(
            "ephemos_circular_calls_detected_total",
            "Outbound calls rejected because the caller was already in the chain",
        )?;
        let authentication = IntCounterVec::new(
            Opts::new(
                "ephemos_authentication_total",
                "Inbound authentication outcomes",
            ),
            &["result"],
        )?;

        registry.register(Box::new(propagation.clone()))?;
        registry.register(Box::new(extraction.clone()))?;
        registry.register(Box::new(call_chain_depth.clone()))?;
        registry.register(Box::new(circular_calls.clone()))?;
        registry.register(Box::new(authentication.clone()))?;

        Ok(Self {
            propagation,
            extraction,
            call_chain_depth,
            circular_calls,
            authentication,
        })
    }
}

impl MetricsCollector for PrometheusMetricsCollector {
    fn record_propagation_success(&self, method: &str, _request_id: &str) {
        self.propagation
            .with_label_values(&[method, "success", ""])
            .inc();
    }

    fn record_propagation_failure(&self, method: &str, reason: &str) {
        self.propagation
            .with_label_values(&[method, "failure", reason])
            .inc();
    }

    fn record_extraction_success(&self, method: &str, _request_id: &str) {
        self.extraction.with_label_values(&[method]).inc();
    }

    fn record_call_chain_depth(&self, depth: usize) {
        self.call_chain_depth.observe(depth as f64);
    }

    fn record_circular_call_detected(&self, _identity: &str) {
        self.circular_calls.inc();
    }

    fn record_authentication(&self, result: &str) {
        self.authentication.with_label_values(&[result]).inc();
    }
}
