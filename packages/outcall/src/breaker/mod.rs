//! Per-endpoint circuit breaking
//!
//! Hystrix-style breaker: a rolling window of success/failure/timeout/
//! rejection counts drives an open/closed decision, an open circuit admits
//! exactly one probe per sleep window (compare-and-swap race; losers are
//! denied instantly), and a probe success closes the circuit and resets the
//! window. All transitions are atomic; there is no lock on the request path.

pub(crate) mod rolling;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::InvokeConfig;

pub use rolling::{RollingEvent, RollingNumber};

use rolling::now_ms;

/// Breaker tuning, shared by every breaker a registry creates.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    pub volume_threshold: u64,
    pub error_threshold_pct: u8,
    pub sleep_window: Duration,
    pub window: Duration,
    pub window_buckets: u32,
    pub snapshot_interval: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            volume_threshold: 20,
            error_threshold_pct: 50,
            sleep_window: Duration::from_secs(5),
            window: Duration::from_secs(10),
            window_buckets: 10,
            snapshot_interval: Duration::from_millis(500),
        }
    }
}

impl BreakerSettings {
    #[must_use]
    pub fn from_config(config: &InvokeConfig) -> Self {
        Self {
            volume_threshold: config.breaker_volume_threshold,
            error_threshold_pct: config.breaker_error_threshold_pct,
            sleep_window: config.breaker_sleep_window,
            window: config.breaker_window,
            window_buckets: config.breaker_window_buckets,
            snapshot_interval: config.breaker_snapshot_interval,
        }
    }
}

/// Cached view of recent window statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCounts {
    pub total: u64,
    pub error: u64,
    pub error_percentage: u8,
}

/// Circuit breaker for one endpoint.
pub struct CircuitBreaker {
    settings: BreakerSettings,
    counter: RollingNumber,
    circuit_open: AtomicBool,
    /// When the circuit opened, or when the last probe was admitted.
    opened_or_last_probe_ms: AtomicU64,
    force_open: AtomicBool,
    force_closed: AtomicBool,
    // Health snapshot, recomputed at most once per snapshot interval so
    // high-frequency callers do not pay for summing buckets on every call.
    snapshot_total: AtomicU64,
    snapshot_error: AtomicU64,
    snapshot_pct: AtomicU64,
    last_snapshot_ms: AtomicU64,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(settings: BreakerSettings) -> Self {
        let counter = RollingNumber::new(
            settings.window.as_millis() as u64,
            settings.window_buckets,
        );
        Self {
            settings,
            counter,
            circuit_open: AtomicBool::new(false),
            opened_or_last_probe_ms: AtomicU64::new(0),
            force_open: AtomicBool::new(false),
            force_closed: AtomicBool::new(false),
            snapshot_total: AtomicU64::new(0),
            snapshot_error: AtomicU64::new(0),
            snapshot_pct: AtomicU64::new(0),
            last_snapshot_ms: AtomicU64::new(now_ms()),
        }
    }

    /// Whether a request may proceed right now.
    ///
    /// Open circuits admit exactly one probe once the sleep window has
    /// elapsed; every other concurrent caller is denied without blocking.
    #[must_use]
    pub fn allow_request(&self) -> bool {
        if self.force_open.load(Ordering::Relaxed) {
            return false;
        }
        if self.force_closed.load(Ordering::Relaxed) {
            // Keep the statistics machinery running even though the
            // decision is overridden.
            let _ = self.is_open();
            return true;
        }
        !self.is_open() || self.allow_single_probe()
    }

    /// Whether the circuit is currently open, tripping it if the rolling
    /// window has crossed both thresholds.
    #[must_use]
    pub fn is_open(&self) -> bool {
        if self.circuit_open.load(Ordering::Acquire) {
            return true;
        }

        let health = self.health_counts();
        if health.total < self.settings.volume_threshold {
            return false;
        }
        if u64::from(health.error_percentage) < u64::from(self.settings.error_threshold_pct) {
            return false;
        }

        if self
            .circuit_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.opened_or_last_probe_ms.store(now_ms(), Ordering::Release);
            tracing::warn!(
                error_pct = health.error_percentage,
                total = health.total,
                "circuit breaker opened"
            );
        }
        // A racing thread may have tripped it first; either way it is open.
        true
    }

    /// Feedback from a completed request that succeeded. Closes the circuit
    /// (probe success) and resets the window when it was open.
    pub fn mark_success(&self) {
        self.counter.increment(RollingEvent::Success);
        if self.circuit_open.load(Ordering::Acquire) {
            self.reset_counter();
            self.circuit_open.store(false, Ordering::Release);
            tracing::info!("circuit breaker closed after successful probe");
        }
    }

    /// Feedback from a failed request.
    pub fn mark_failure(&self) {
        self.counter.increment(RollingEvent::Failure);
    }

    /// Feedback from a timed-out request.
    pub fn mark_timeout(&self) {
        self.counter.increment(RollingEvent::Timeout);
    }

    /// Feedback from a request the worker pool rejected.
    pub fn mark_rejected(&self) {
        self.counter.increment(RollingEvent::Rejected);
    }

    /// Operational override: deny everything until lifted.
    pub fn set_force_open(&self, on: bool) {
        self.force_open.store(on, Ordering::Relaxed);
    }

    /// Operational override: allow everything until lifted.
    pub fn set_force_closed(&self, on: bool) {
        self.force_closed.store(on, Ordering::Relaxed);
    }

    /// Recent window statistics, recomputed at most once per snapshot
    /// interval. Losers of the recompute race read the previous snapshot.
    #[must_use]
    pub fn health_counts(&self) -> HealthCounts {
        let last = self.last_snapshot_ms.load(Ordering::Acquire);
        let now = now_ms();

        if now.saturating_sub(last) >= self.settings.snapshot_interval.as_millis() as u64
            && self
                .last_snapshot_ms
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            let success = self.counter.rolling_sum(RollingEvent::Success);
            let failure = self.counter.rolling_sum(RollingEvent::Failure);
            let timeout = self.counter.rolling_sum(RollingEvent::Timeout);
            let rejected = self.counter.rolling_sum(RollingEvent::Rejected);
            let error = failure + timeout + rejected;
            let total = error + success;
            let pct = if total > 0 {
                ((error as f64 / total as f64) * 100.0) as u64
            } else {
                0
            };
            self.snapshot_total.store(total, Ordering::Relaxed);
            self.snapshot_error.store(error, Ordering::Relaxed);
            self.snapshot_pct.store(pct, Ordering::Relaxed);
        }

        HealthCounts {
            total: self.snapshot_total.load(Ordering::Relaxed),
            error: self.snapshot_error.load(Ordering::Relaxed),
            error_percentage: self.snapshot_pct.load(Ordering::Relaxed) as u8,
        }
    }

    fn allow_single_probe(&self) -> bool {
        let last = self.opened_or_last_probe_ms.load(Ordering::Acquire);
        let now = now_ms();
        // Push the probe timestamp forward so exactly one caller per sleep
        // window wins the request; a failed probe restarts the window from
        // its admission time.
        if self.circuit_open.load(Ordering::Acquire)
            && now > last + self.settings.sleep_window.as_millis() as u64
            && self
                .opened_or_last_probe_ms
                .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            tracing::debug!("circuit breaker open, admitting single probe");
            return true;
        }
        false
    }

    fn reset_counter(&self) {
        self.counter.reset();
        self.last_snapshot_ms.store(now_ms(), Ordering::Release);
        self.snapshot_total.store(0, Ordering::Relaxed);
        self.snapshot_error.store(0, Ordering::Relaxed);
        self.snapshot_pct.store(0, Ordering::Relaxed);
    }
}

/// Lazily-created breakers keyed by `host:port`.
///
/// Size-bounded: at capacity an arbitrary entry is dropped before inserting
/// a new key, keeping memory bounded under endpoint churn.
pub struct BreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    settings: BreakerSettings,
    capacity: usize,
}

impl BreakerRegistry {
    #[must_use]
    pub fn new(settings: BreakerSettings) -> Self {
        Self::with_capacity(settings, 1024)
    }

    #[must_use]
    pub fn with_capacity(settings: BreakerSettings, capacity: usize) -> Self {
        Self {
            breakers: DashMap::new(),
            settings,
            capacity,
        }
    }

    /// Breaker for one endpoint key, created on first use.
    #[must_use]
    pub fn get(&self, key: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(key) {
            return Arc::clone(existing.value());
        }
        if self.breakers.len() >= self.capacity {
            // Bind the victim key first: the iterator holds a shard read lock,
            // which must be released before `remove` takes the write lock.
            let victim = self.breakers.iter().next().map(|e| e.key().clone());
            if let Some(victim) = victim {
                self.breakers.remove(&victim);
            }
        }
        Arc::clone(
            self.breakers
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(self.settings.clone())))
                .value(),
        )
    }

    /// Drop the breaker for one endpoint key.
    pub fn remove(&self, key: &str) {
        self.breakers.remove(key);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
