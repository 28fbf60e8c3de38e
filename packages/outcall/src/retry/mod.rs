//! Retry policy
//!
//! Decides, per failed attempt, whether the invocation may be retried on the
//! same endpoint or on the next one, and which failures count against the
//! circuit breaker. Classification goes through the error predicates, which
//! walk the cause chain, so a reset buried under wrapper errors is still
//! recognized.

use crate::config::InvokeConfig;
use crate::error::{Error, Kind};

/// Per-invocation retry budget and failure classification.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_same: u32,
    max_next: u32,
    enabled: bool,
    retriable: Vec<Kind>,
    circuit_related: Vec<Kind>,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_same: u32, max_next: u32, enabled: bool) -> Self {
        Self {
            max_same,
            max_next,
            enabled,
            retriable: vec![Kind::Connect, Kind::Reset],
            circuit_related: vec![
                Kind::Timeout,
                Kind::Reset,
                Kind::PoolRejected,
                Kind::CircuitOpen,
            ],
        }
    }

    #[must_use]
    pub fn from_config(config: &InvokeConfig) -> Self {
        Self::new(
            config.max_retries_same_server,
            config.max_retries_next_server,
            config.retry_enabled,
        )
    }

    /// Extend the retriable set.
    #[must_use]
    pub fn add_retriable(mut self, kind: Kind) -> Self {
        if !self.retriable.contains(&kind) {
            self.retriable.push(kind);
        }
        self
    }

    /// Extend the set of failures the breaker counts.
    #[must_use]
    pub fn add_circuit_related(mut self, kind: Kind) -> Self {
        if !self.circuit_related.contains(&kind) {
            self.circuit_related.push(kind);
        }
        self
    }

    #[must_use]
    pub fn max_retries_same_server(&self) -> u32 {
        self.max_same
    }

    #[must_use]
    pub fn max_retries_next_server(&self) -> u32 {
        self.max_next
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether this failure may be retried at all. Disabled policies retry
    /// nothing.
    #[must_use]
    pub fn is_retriable(&self, error: &Error) -> bool {
        self.enabled && self.retriable.iter().any(|kind| matches(error, *kind))
    }

    /// Whether this failure should count toward opening the circuit. Not
    /// gated on `enabled`: breaker accounting is independent of retrying.
    #[must_use]
    pub fn is_circuit_tripping(&self, error: &Error) -> bool {
        self.circuit_related.iter().any(|kind| matches(error, *kind))
    }

    /// Combined decision for a failed attempt: a kind in either set
    /// warrants another attempt, so a failure that trips the breaker also
    /// fails over to the next endpoint. Disabled policies retry nothing.
    #[must_use]
    pub fn should_retry(&self, error: &Error) -> bool {
        self.enabled && (self.is_retriable(error) || self.is_circuit_tripping(error))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&InvokeConfig::default())
    }
}

fn matches(error: &Error, kind: Kind) -> bool {
    match kind {
        Kind::NoEndpoint => error.is_no_endpoint(),
        Kind::CircuitOpen => error.is_circuit_open(),
        Kind::Connect => error.is_connect(),
        Kind::Reset => error.is_reset(),
        Kind::Timeout => error.is_timeout(),
        Kind::PoolRejected => error.is_pool_rejected(),
        Kind::Status(status) => error.status() == Some(status),
        Kind::Body => error.is_body(),
        Kind::Builder => error.kind() == Kind::Builder,
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn connection_refused_is_retriable() {
        let policy = RetryPolicy::new(1, 1, true);
        let refused = Error::new(Kind::Connect);
        assert!(policy.is_retriable(&refused));
        assert!(!policy.is_circuit_tripping(&refused));
    }

    #[test]
    fn reset_found_through_cause_chain() {
        let policy = RetryPolicy::new(1, 1, true);
        let wrapped = Error::new(Kind::Body)
            .with(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"));
        assert!(policy.is_retriable(&wrapped));
        assert!(policy.is_circuit_tripping(&wrapped));
    }

    #[test]
    fn timeout_trips_circuit_and_warrants_retry() {
        let policy = RetryPolicy::new(1, 1, true);
        let timeout = Error::new(Kind::Timeout);
        assert!(!policy.is_retriable(&timeout));
        assert!(policy.is_circuit_tripping(&timeout));
        // The combined decision covers circuit-tripping kinds too.
        assert!(policy.should_retry(&timeout));
    }

    #[test]
    fn disabled_policy_retries_nothing_but_still_trips() {
        let policy = RetryPolicy::new(3, 3, false);
        let reset = Error::new(Kind::Reset);
        assert!(!policy.is_retriable(&reset));
        assert!(!policy.should_retry(&reset));
        assert!(policy.is_circuit_tripping(&reset));
    }

    #[test]
    fn added_circuit_related_kind_warrants_retry() {
        let policy = RetryPolicy::new(1, 1, true).add_circuit_related(Kind::Body);
        let body = Error::new(Kind::Body);
        assert!(!policy.is_retriable(&body));
        assert!(policy.should_retry(&body));

        let plain = RetryPolicy::new(1, 1, true);
        assert!(!plain.should_retry(&Error::new(Kind::Body)));
    }

    #[test]
    fn custom_status_can_be_made_retriable() {
        let policy = RetryPolicy::new(1, 1, true)
            .add_retriable(Kind::Status(http::StatusCode::SERVICE_UNAVAILABLE));
        let unavailable = Error::new(Kind::Status(http::StatusCode::SERVICE_UNAVAILABLE));
        assert!(policy.is_retriable(&unavailable));
        let other = Error::new(Kind::Status(http::StatusCode::BAD_GATEWAY));
        assert!(!policy.is_retriable(&other));
    }
}
