//! Endpoint selection
//!
//! [`ServerDirectory`] resolves a logical target into candidate endpoints
//! (static list or DNS); [`LoadBalancer`] holds the current candidate set and
//! picks one endpoint per attempt, round-robin over alive endpoints, with
//! atomic list swaps and optional TCP liveness probing.

pub(crate) mod directory;
pub(crate) mod endpoint;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::task::JoinHandle;

pub use directory::{ServerDirectory, TargetAddr};
pub use endpoint::Endpoint;

/// Connect timeout for liveness probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Round-robin balancer over a directory-backed candidate list.
///
/// The candidate list is swapped wholesale on refresh; readers clone an
/// `Arc` snapshot and never observe a partially updated list.
pub struct LoadBalancer {
    directory: ServerDirectory,
    servers: RwLock<Arc<Vec<Endpoint>>>,
    position: AtomicUsize,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl LoadBalancer {
    /// Balancer over a fixed endpoint list.
    #[must_use]
    pub fn fixed(servers: Vec<Endpoint>) -> Arc<Self> {
        Arc::new(Self {
            directory: ServerDirectory::Static(servers.clone()),
            servers: RwLock::new(Arc::new(servers)),
            position: AtomicUsize::new(0),
            refresh_task: Mutex::new(None),
        })
    }

    /// Balancer whose candidate list tracks a server directory.
    ///
    /// The list starts empty; call [`LoadBalancer::refresh`] (or rely on the
    /// background task) to populate it.
    #[must_use]
    pub fn new(directory: ServerDirectory) -> Arc<Self> {
        Arc::new(Self {
            directory,
            servers: RwLock::new(Arc::new(Vec::new())),
            position: AtomicUsize::new(0),
            refresh_task: Mutex::new(None),
        })
    }

    /// Pick the next alive endpoint, or `None` when the candidate list is
    /// empty or fully dead. Selection failure is terminal for the caller's
    /// current attempt path, never retried.
    #[must_use]
    pub fn choose_server(&self) -> Option<Endpoint> {
        let snapshot = self.snapshot();
        let alive: Vec<&Endpoint> = snapshot.iter().filter(|s| s.is_alive()).collect();
        if alive.is_empty() {
            return None;
        }
        let pos = self.position.fetch_add(1, Ordering::Relaxed) % alive.len();
        Some(alive[pos].clone())
    }

    /// Current candidate snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Endpoint>> {
        match self.servers.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-query the directory and swap in the fresh candidate list.
    ///
    /// An empty answer is retried once with a forced DNS refresh; if that is
    /// empty too the previous list is kept, so a transient resolver outage
    /// does not wipe a working candidate set.
    pub async fn refresh(&self) {
        let mut servers = self.directory.resolve(false).await;
        if servers.is_empty() {
            servers = self.directory.resolve(true).await;
        }
        if !servers.is_empty() {
            self.swap(servers);
        }
    }

    fn swap(&self, servers: Vec<Endpoint>) {
        let next = Arc::new(servers);
        match self.servers.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Probe every candidate with a connect-and-disconnect check and flip
    /// its alive flag accordingly.
    pub async fn probe_all(&self) {
        let snapshot = self.snapshot();
        for server in snapshot.iter() {
            let alive = probe(server).await;
            server.set_alive(alive);
            if !alive {
                tracing::debug!(server = %server, "liveness probe failed");
            }
        }
    }

    /// Start the periodic refresh task. Each tick re-resolves the candidate
    /// list and then probes it, so endpoints that died between refreshes are
    /// taken out of rotation. Idempotent; a second call replaces the
    /// previous task.
    pub fn start_refresh(self: &Arc<Self>, interval: Duration) {
        let balancer = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                balancer.refresh().await;
                balancer.probe_all().await;
            }
        });
        if let Ok(mut slot) = self.refresh_task.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop the refresh task and drop the candidate list.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.refresh_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
        self.swap(Vec::new());
    }
}

impl Drop for LoadBalancer {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.refresh_task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

/// Lightweight connect-and-disconnect liveness check.
async fn probe(server: &Endpoint) -> bool {
    let addr = (server.host().to_string(), server.port());
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, tokio::net::TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}
