//! TTL-bounded DNS answer cache
//!
//! Successful lookups are cached for a short TTL (default 10s) so hot call
//! paths do not hammer the resolver. Failed lookups propagate to the caller
//! and are never cached, allowing fast recovery once the zone is healthy.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::Resolve;
use crate::error::Result;

struct CachedAnswer {
    addrs: Arc<Vec<IpAddr>>,
    resolved_at: Instant,
}

/// Caching front for a [`Resolve`] implementation.
pub struct DnsCache {
    resolver: Arc<dyn Resolve>,
    entries: DashMap<String, CachedAnswer>,
    ttl: Duration,
    max_entries: usize,
}

impl DnsCache {
    pub fn new(resolver: Arc<dyn Resolve>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            resolver,
            entries: DashMap::new(),
            ttl,
            max_entries,
        }
    }

    /// Resolve `host`, serving from cache within the TTL.
    ///
    /// `force` bypasses the cache entirely; the fresh answer still lands in
    /// the cache. The returned `Arc` is shared: two lookups inside one TTL
    /// window observe the same answer object.
    pub async fn lookup(&self, host: &str, force: bool) -> Result<Arc<Vec<IpAddr>>> {
        if !force {
            if let Some(entry) = self.entries.get(host) {
                if entry.resolved_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&entry.addrs));
                }
            }
        }

        let addrs = match self.resolver.lookup(host).await {
            Ok(addrs) => Arc::new(addrs),
            Err(e) => {
                tracing::error!(host, error = %e, "dns lookup failed");
                return Err(e);
            }
        };

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(host) {
            self.evict_oldest();
        }
        self.entries.insert(
            host.to_string(),
            CachedAnswer {
                addrs: Arc::clone(&addrs),
                resolved_at: Instant::now(),
            },
        );
        Ok(addrs)
    }

    /// Number of cached answers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all cached answers.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().resolved_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            log::debug!("dns cache full, evicting {key}");
            self.entries.remove(&key);
        }
    }
}
