//! Per-target balancer and breaker bookkeeping
//!
//! One logical target (scheme + host + port) gets one lazily created
//! [`LoadBalancer`] with a periodic refresh task, plus per-endpoint circuit
//! breakers from a shared registry. Targets that go unused are evicted and
//! their refresh tasks torn down, so a process talking to many short-lived
//! targets does not accumulate background work.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::balancer::{Endpoint, LoadBalancer, ServerDirectory, TargetAddr};
use crate::breaker::rolling::now_ms;
use crate::breaker::{BreakerRegistry, BreakerSettings, CircuitBreaker};
use crate::config::InvokeConfig;
use crate::dns::DnsCache;

const DEFAULT_CAPACITY: usize = 1000;

struct TargetEntry {
    balancer: Arc<LoadBalancer>,
    last_access_ms: AtomicU64,
}

/// Lazily populated map of logical targets to balancers and breakers.
pub struct TargetRegistry {
    targets: DashMap<String, TargetEntry>,
    breakers: Arc<BreakerRegistry>,
    dns: Arc<DnsCache>,
    refresh_interval: Duration,
    idle_after: Duration,
    capacity: usize,
}

impl TargetRegistry {
    #[must_use]
    pub fn new(config: &InvokeConfig, dns: Arc<DnsCache>) -> Self {
        Self {
            targets: DashMap::new(),
            breakers: Arc::new(BreakerRegistry::new(BreakerSettings::from_config(config))),
            dns,
            refresh_interval: config.balancer_refresh_interval,
            idle_after: config.target_idle_eviction,
            capacity: DEFAULT_CAPACITY,
        }
    }

    /// The balancer for a logical target, created (and its refresh task
    /// started) on first access. Access also sweeps idle targets.
    #[must_use]
    pub fn balancer_for(&self, target: &TargetAddr) -> Arc<LoadBalancer> {
        self.evict_idle();

        let key = target.key();
        if let Some(entry) = self.targets.get(&key) {
            entry.last_access_ms.store(now_ms(), Ordering::Relaxed);
            return Arc::clone(&entry.balancer);
        }

        if self.targets.len() >= self.capacity {
            self.evict_oldest();
        }

        let entry = self.targets.entry(key).or_insert_with(|| {
            let balancer = LoadBalancer::new(ServerDirectory::Dns {
                target: target.clone(),
                dns: Arc::clone(&self.dns),
            });
            balancer.start_refresh(self.refresh_interval);
            TargetEntry {
                balancer,
                last_access_ms: AtomicU64::new(now_ms()),
            }
        });
        entry.last_access_ms.store(now_ms(), Ordering::Relaxed);
        Arc::clone(&entry.balancer)
    }

    /// The circuit breaker guarding one concrete endpoint.
    #[must_use]
    pub fn breaker_for(&self, endpoint: &Endpoint) -> Arc<CircuitBreaker> {
        self.breakers.get(&endpoint.key())
    }

    #[must_use]
    pub fn breakers(&self) -> Arc<BreakerRegistry> {
        Arc::clone(&self.breakers)
    }

    /// Drop every target not accessed within the idle window, shutting down
    /// its refresh task.
    pub fn evict_idle(&self) {
        let now = now_ms();
        let idle_ms = self.idle_after.as_millis() as u64;
        let stale: Vec<String> = self
            .targets
            .iter()
            .filter(|entry| {
                now.saturating_sub(entry.last_access_ms.load(Ordering::Relaxed)) > idle_ms
            })
            .map(|entry| entry.key().clone())
            .collect();
        for key in stale {
            if let Some((key, entry)) = self.targets.remove(&key) {
                tracing::debug!(target = %key, "evicting idle target");
                entry.balancer.shutdown();
            }
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .targets
            .iter()
            .min_by_key(|entry| entry.last_access_ms.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            if let Some((_, entry)) = self.targets.remove(&key) {
                entry.balancer.shutdown();
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
