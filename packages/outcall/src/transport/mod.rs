//! Transport boundary
//!
//! One [`Transport`] sends one prepared request to one concrete endpoint and
//! yields an asynchronous result. Two interchangeable implementations:
//! [`PooledTransport`] dispatches directly on the reactor through a pooled
//! hyper client, and [`IsolatedTransport`] wraps any transport in a bounded
//! worker pool with a queue-wait deadline. The orchestrator only sees the
//! trait.

pub(crate) mod isolated;
pub(crate) mod pooled;
pub(crate) mod route;

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode};

use crate::balancer::Endpoint;
use crate::config::InvokeConfig;
use crate::error::Result;

pub use isolated::IsolatedTransport;
pub use pooled::PooledTransport;
pub use route::ProxyRouter;

/// Per-attempt timeout budget carried by a transport.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutConfig {
    pub connect: Duration,
    pub read: Duration,
    pub queue: Duration,
}

impl TimeoutConfig {
    #[must_use]
    pub fn from_config(config: &InvokeConfig) -> Self {
        Self {
            connect: config.connect_timeout,
            read: config.read_timeout,
            queue: config.request_queue_timeout,
        }
    }

    /// Worst-case wall clock for one attempt; used to derive the overall
    /// retry budget when the caller supplies no deadline.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.connect + self.read + self.queue
    }
}

/// A request prepared once and re-sent verbatim on every retry attempt.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: url::Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl PreparedRequest {
    #[must_use]
    pub fn new(method: Method, url: url::Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn get(url: url::Url) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn post(url: url::Url, body: Bytes) -> Self {
        let mut request = Self::new(Method::POST, url);
        request.body = body;
        request
    }

    #[must_use]
    pub fn with_header(mut self, name: http::header::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// A fully buffered transport-level response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Send one prepared request to one concrete endpoint.
pub trait Transport: Send + Sync + 'static {
    /// Dispatch asynchronously. The future resolves to the buffered
    /// response or a classified error; it never panics the caller.
    fn execute(
        &self,
        endpoint: &Endpoint,
        request: &PreparedRequest,
    ) -> BoxFuture<'static, Result<RawResponse>>;

    /// Monotonic milliseconds of the most recent dispatch, feeding idle
    /// eviction.
    fn last_access_ms(&self) -> u64;

    /// The timeout budget this transport applies per attempt.
    fn default_timeouts(&self) -> TimeoutConfig;

    /// Release pooled resources. Subsequent dispatches fail.
    fn close(&self);
}
