//! Invocation configuration surface
//!
//! One flat configuration struct covering the transport pool, retry policy,
//! circuit breaker, DNS cache and proxy routing, with builder-style setters.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the outbound invocation layer.
///
/// Defaults mirror a conservative production profile: short connect/read
/// timeouts, retries disabled until explicitly enabled, and Hystrix-style
/// breaker thresholds (20 requests / 50% errors / 5s sleep window).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeConfig {
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// Socket read timeout for one attempt.
    pub read_timeout: Duration,
    /// How long a request may wait for a pooled worker slot.
    pub request_queue_timeout: Duration,
    /// Maximum in-flight requests through an isolated transport.
    pub max_total_connections: usize,
    /// Maximum idle pooled connections kept per endpoint.
    pub max_per_endpoint: usize,
    /// How long idle pooled connections are kept alive.
    pub pool_idle_timeout: Duration,

    /// Master switch for retrying classified-transient failures.
    pub retry_enabled: bool,
    /// Retries permitted against the endpoint that just failed.
    pub max_retries_same_server: u32,
    /// Endpoint switches permitted after same-server retries are spent.
    pub max_retries_next_server: u32,

    /// Requests that must land in the rolling window before the breaker
    /// computes an error rate at all.
    pub breaker_volume_threshold: u64,
    /// Error percentage at or above which the breaker opens.
    pub breaker_error_threshold_pct: u8,
    /// How long an open breaker sleeps before admitting a probe.
    pub breaker_sleep_window: Duration,
    /// Span of the rolling statistical window.
    pub breaker_window: Duration,
    /// Bucket count inside the rolling window.
    pub breaker_window_buckets: u32,
    /// Minimum interval between health snapshot recomputations.
    pub breaker_snapshot_interval: Duration,

    /// DNS answer time-to-live.
    pub dns_ttl: Duration,
    /// Maximum cached DNS entries.
    pub dns_max_entries: usize,

    /// Interval between background candidate-list refreshes.
    pub balancer_refresh_interval: Duration,
    /// Idle window after which per-target state is torn down.
    pub target_idle_eviction: Duration,

    /// Optional forward proxy, as `host:port`.
    pub proxy: Option<String>,
    /// IPv4 subnets (CIDR notation) dialed directly, bypassing the proxy.
    pub proxy_ignore: Vec<String>,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            request_queue_timeout: Duration::from_millis(500),
            max_total_connections: 2000,
            max_per_endpoint: 1000,
            pool_idle_timeout: Duration::from_secs(90),

            retry_enabled: false,
            max_retries_same_server: 0,
            max_retries_next_server: 0,

            breaker_volume_threshold: 20,
            breaker_error_threshold_pct: 50,
            breaker_sleep_window: Duration::from_secs(5),
            breaker_window: Duration::from_secs(10),
            breaker_window_buckets: 10,
            breaker_snapshot_interval: Duration::from_millis(500),

            dns_ttl: Duration::from_secs(10),
            dns_max_entries: 1000,

            balancer_refresh_interval: Duration::from_secs(30),
            target_idle_eviction: Duration::from_secs(600),

            proxy: None,
            proxy_ignore: Vec::new(),
        }
    }
}

impl InvokeConfig {
    /// Set the connection establishment timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-attempt read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set how long a request may queue for a worker slot.
    #[must_use]
    pub fn with_request_queue_timeout(mut self, timeout: Duration) -> Self {
        self.request_queue_timeout = timeout;
        self
    }

    /// Enable retries with the given same-server / next-server budgets.
    #[must_use]
    pub fn with_retries(mut self, same_server: u32, next_server: u32) -> Self {
        self.retry_enabled = true;
        self.max_retries_same_server = same_server;
        self.max_retries_next_server = next_server;
        self
    }

    /// Set the breaker trip thresholds.
    #[must_use]
    pub fn with_breaker_thresholds(mut self, volume: u64, error_pct: u8) -> Self {
        self.breaker_volume_threshold = volume;
        self.breaker_error_threshold_pct = error_pct;
        self
    }

    /// Set the breaker sleep window.
    #[must_use]
    pub fn with_breaker_sleep_window(mut self, window: Duration) -> Self {
        self.breaker_sleep_window = window;
        self
    }

    /// Set the DNS cache time-to-live and capacity.
    #[must_use]
    pub fn with_dns_cache(mut self, ttl: Duration, max_entries: usize) -> Self {
        self.dns_ttl = ttl;
        self.dns_max_entries = max_entries;
        self
    }

    /// Route requests through a forward proxy, except for the listed
    /// IPv4 subnets.
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>, ignore: Vec<String>) -> Self {
        self.proxy = Some(proxy.into());
        self.proxy_ignore = ignore;
        self
    }

    /// Wall-clock budget for one logical call when the caller supplies no
    /// deadline: connect + read + queue-wait, the worst case for a single
    /// attempt.
    #[must_use]
    pub fn overall_budget(&self) -> Duration {
        self.connect_timeout + self.read_timeout + self.request_queue_timeout
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.breaker_error_threshold_pct > 100 {
            return Err("breaker_error_threshold_pct must be <= 100".to_string());
        }
        if self.breaker_window_buckets == 0 {
            return Err("breaker_window_buckets must be at least 1".to_string());
        }
        if self.breaker_window.as_millis() % u128::from(self.breaker_window_buckets) != 0 {
            return Err("breaker_window must divide evenly into buckets".to_string());
        }
        if self.max_total_connections == 0 {
            return Err("max_total_connections must be at least 1".to_string());
        }
        if self.dns_max_entries == 0 {
            return Err("dns_max_entries must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(InvokeConfig::default().validate().is_ok());
    }

    #[test]
    fn uneven_buckets_rejected() {
        let config = InvokeConfig {
            breaker_window: Duration::from_millis(10_001),
            ..InvokeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn overall_budget_sums_timeouts() {
        let config = InvokeConfig::default();
        assert_eq!(config.overall_budget(), Duration::from_millis(15_500));
    }

    #[test]
    fn survives_serde_round_trip() {
        let config = InvokeConfig::default()
            .with_retries(1, 2)
            .with_proxy("proxy.internal:3128", vec!["10.0.0.0/8".to_string()]);
        let json = serde_json::to_string(&config).unwrap();
        let back: InvokeConfig = serde_json::from_str(&json).unwrap();
        assert!(back.retry_enabled);
        assert_eq!(back.max_retries_next_server, 2);
        assert_eq!(back.proxy.as_deref(), Some("proxy.internal:3128"));
        assert_eq!(back.connect_timeout, config.connect_timeout);
    }
}
