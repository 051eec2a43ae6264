//! Deterministic collaborators for tests
//!
//! Pin the clock, make request IDs predictable, and capture metrics calls
//! so assertions can inspect them.

use crate::correlation::{Clock, IdGenerator};
use crate::metrics::MetricsCollector;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Clock frozen at a settable instant
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Yields `<prefix>-1`, `<prefix>-2`, ...
#[derive(Debug)]
pub struct SequenceIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequenceIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

/// One captured metrics call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricEvent {
    PropagationSuccess { method: String, request_id: String },
    PropagationFailure { method: String, reason: String },
    ExtractionSuccess { method: String, request_id: String },
    CallChainDepth(usize),
    CircularCallDetected { identity: String },
    Authentication { result: String },
}

/// Records every call in order; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct RecordingMetricsCollector {
    events: Arc<Mutex<Vec<MetricEvent>>>,
}

impl RecordingMetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MetricEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&MetricEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    fn push(&self, event: MetricEvent) {
        self.events.lock().push(event);
    }
}

impl MetricsCollector for RecordingMetricsCollector {
    fn record_propagation_success(&self, method: &str, request_id: &str) {
        self.push(MetricEvent::PropagationSuccess {
            method: method.to_string(),
            request_id: request_id.to_string(),
        });
    }

    fn record_propagation_failure(&self, method: &str, reason: &str) {
        self.push(MetricEvent::PropagationFailure {
            method: method.to_string(),
            reason: reason.to_string(),
        });
    }

    fn record_extraction_success(&self, method: &str, request_id: &str) {
        self.push(MetricEvent::ExtractionSuccess {
            method: method.to_string(),
            request_id: request_id.to_string(),
        });
    }

    fn record_call_chain_depth(&self, depth: usize) {
        self.push(MetricEvent::CallChainDepth(depth));
    }

    fn record_circular_call_detected(&self, identity: &str) {
        self.push(MetricEvent::CircularCallDetected {
            identity: identity.to_string(),
        });
    }

    fn record_authentication(&self, result: &str) {
        self.push(MetricEvent::Authentication {
            result: result.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_set() {
        let clock = FixedClock::new(Utc.timestamp_opt(10, 0).unwrap());
        assert_eq!(clock.now().timestamp(), 10);

        clock.set(Utc.timestamp_opt(20, 0).unwrap());
        assert_eq!(clock.now().timestamp(), 20);
    }

    #[test]
    fn test_recording_collector_shared_between_clones() {
        let metrics = RecordingMetricsCollector::new();
        let clone = metrics.clone();

        clone.record_call_chain_depth(3);
        clone.record_authentication("success");

        assert_eq!(
            metrics.events(),
            vec![
                MetricEvent::CallChainDepth(3),
                MetricEvent::Authentication {
                    result: "success".to_string()
                }
            ]
        );
    }
}
