//! Bounded worker-pool isolation around another transport.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;

use crate::balancer::Endpoint;
use crate::error::{Error, Kind, Result};

use super::{PreparedRequest, RawResponse, TimeoutConfig, Transport};

/// Caps in-flight requests through the inner transport.
///
/// A request first acquires a pool slot; waiting for one is bounded by the
/// queue timeout and a miss surfaces as [`Kind::PoolRejected`], which the
/// orchestrator feeds back to the breaker as a rejection. Callers never
/// deadlock on pool capacity.
pub struct IsolatedTransport {
    inner: Arc<dyn Transport>,
    permits: Arc<Semaphore>,
    queue_timeout: Duration,
}

impl IsolatedTransport {
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>, pool_size: usize, queue_timeout: Duration) -> Self {
        Self {
            inner,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            queue_timeout,
        }
    }
}

impl Transport for IsolatedTransport {
    fn execute(
        &self,
        endpoint: &Endpoint,
        request: &PreparedRequest,
    ) -> BoxFuture<'static, Result<RawResponse>> {
        let inner = Arc::clone(&self.inner);
        let permits = Arc::clone(&self.permits);
        let queue_timeout = self.queue_timeout;
        let endpoint = endpoint.clone();
        let request = request.clone();

        Box::pin(async move {
            let permit = tokio::time::timeout(queue_timeout, permits.acquire_owned())
                .await
                .map_err(|_| Error::new(Kind::PoolRejected))?
                .map_err(|_| Error::new(Kind::PoolRejected))?;

            let result = inner.execute(&endpoint, &request).await;
            drop(permit);
            result
        })
    }

    fn last_access_ms(&self) -> u64 {
        self.inner.last_access_ms()
    }

    fn default_timeouts(&self) -> TimeoutConfig {
        let mut timeouts = self.inner.default_timeouts();
        timeouts.queue = self.queue_timeout;
        timeouts
    }

    fn close(&self) {
        self.permits.close();
        self.inner.close();
    }
}
