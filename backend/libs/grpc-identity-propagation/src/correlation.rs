//! Request correlation: request IDs and timestamps
//!
//! A request ID is minted once at the first hop and then carried unchanged
//! through every downstream call. Time and ID generation sit behind traits
//! so tests can pin both.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub const REQUEST_ID_PREFIX: &str = "req-";

/// Wall-clock source
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of fresh request IDs
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// `req-` followed by a random UUID in simple (dash-less) form
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate(&self) -> String {
        format!("{}{}", REQUEST_ID_PREFIX, Uuid::new_v4().simple())
    }
}

#[derive(Clone)]
pub struct RequestCorrelator {
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
}

impl fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCorrelator").finish_non_exhaustive()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            id_generator: Arc::new(UuidIdGenerator),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_id_generator(mut self, generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    /// Reuse a non-empty inbound ID verbatim, otherwise mint one
    pub fn request_id(&self, inbound: Option<&str>) -> String {
        match inbound {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.id_generator.generate(),
        }
    }

    /// Current time as Unix milliseconds
    pub fn timestamp_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedClock, SequenceIdGenerator};
    use chrono::TimeZone;
    use std::collections::HashSet;

    #[test]
    fn test_inbound_id_round_trips() {
        let correlator = RequestCorrelator::new();
        assert_eq!(correlator.request_id(Some("req-123")), "req-123");
        assert_eq!(correlator.request_id(Some("opaque value")), "opaque value");
    }

    #[test]
    fn test_absent_or_empty_id_is_generated() {
        let correlator = RequestCorrelator::new();

        let generated = correlator.request_id(None);
        assert!(generated.starts_with(REQUEST_ID_PREFIX));
        assert_eq!(generated.len(), REQUEST_ID_PREFIX.len() + 32);

        assert!(correlator.request_id(Some("")).starts_with(REQUEST_ID_PREFIX));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let correlator = RequestCorrelator::new();
        let ids: HashSet<_> = (0..1000).map(|_| correlator.request_id(None)).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_injected_generator() {
        let correlator = RequestCorrelator::new().with_id_generator(SequenceIdGenerator::new("t"));
        assert_eq!(correlator.request_id(None), "t-1");
        assert_eq!(correlator.request_id(None), "t-2");
        assert_eq!(correlator.request_id(Some("keep")), "keep");

        let closure = RequestCorrelator::new().with_id_generator(|| "fixed".to_string());
        assert_eq!(closure.request_id(None), "fixed");
    }

    #[test]
    fn test_timestamp_from_clock() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let correlator = RequestCorrelator::new().with_clock(FixedClock::new(at));

        assert_eq!(correlator.timestamp_millis(), 1_700_000_000_123);
        assert_eq!(correlator.now(), at);
    }

    #[test]
    fn test_system_clock_is_current() {
        let before = Utc::now().timestamp_millis();
        let stamp = RequestCorrelator::new().timestamp_millis();
        let after = Utc::now().timestamp_millis();

        assert!(stamp >= before && stamp <= after);
    }
}
