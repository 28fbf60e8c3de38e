//! Pooled non-blocking transport over hyper's legacy client.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::header::HOST;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::balancer::Endpoint;
use crate::breaker::rolling::now_ms;
use crate::config::InvokeConfig;
use crate::error::{Error, Kind, Result};

use super::{PreparedRequest, ProxyRouter, RawResponse, TimeoutConfig, Transport};

/// Non-blocking transport: requests run directly on the reactor through a
/// connection pool bounded per endpoint.
pub struct PooledTransport {
    client: Client<HttpConnector, Full<Bytes>>,
    timeouts: TimeoutConfig,
    router: Option<ProxyRouter>,
    last_access_ms: AtomicU64,
    closed: AtomicBool,
}

impl PooledTransport {
    #[must_use]
    pub fn new(config: &InvokeConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.max_per_endpoint)
            .build(connector);

        let router = config.proxy.as_deref().and_then(|proxy| {
            let (host, port) = proxy.split_once(':')?;
            let port = port.parse().ok()?;
            Some(ProxyRouter::new(
                Endpoint::new(host, port),
                &config.proxy_ignore,
            ))
        });

        Self {
            client,
            timeouts: TimeoutConfig::from_config(config),
            router,
            last_access_ms: AtomicU64::new(now_ms()),
            closed: AtomicBool::new(false),
        }
    }

    fn build_request(
        &self,
        dial: &Endpoint,
        request: &PreparedRequest,
    ) -> Result<hyper::Request<Full<Bytes>>> {
        let path_and_query = match request.url.query() {
            Some(query) => format!("{}?{}", request.url.path(), query),
            None => request.url.path().to_string(),
        };
        let uri = format!("http://{}:{}{}", dial.host(), dial.port(), path_and_query)
            .parse::<http::Uri>()
            .map_err(|e| Error::new(Kind::Builder).with(e).with_url(request.url.clone()))?;

        let mut builder = hyper::Request::builder()
            .method(request.method.clone())
            .uri(uri);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        // The connection target is a resolved address (or the proxy); the
        // logical host travels in the Host header.
        if !request.headers.contains_key(HOST) {
            if let Some(host) = request.url.host_str() {
                let host_value = match request.url.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                };
                builder = builder.header(HOST, host_value);
            }
        }

        builder
            .body(Full::new(request.body.clone()))
            .map_err(|e| Error::new(Kind::Builder).with(e).with_url(request.url.clone()))
    }
}

impl Transport for PooledTransport {
    fn execute(
        &self,
        endpoint: &Endpoint,
        request: &PreparedRequest,
    ) -> BoxFuture<'static, Result<RawResponse>> {
        self.last_access_ms.store(now_ms(), Ordering::Relaxed);

        if self.closed.load(Ordering::Acquire) {
            let err = Error::new(Kind::Builder).with(std::io::Error::other("transport closed"));
            return Box::pin(async move { Err(err) });
        }

        let dial = match &self.router {
            Some(router) => router.route(endpoint),
            None => endpoint.clone(),
        };
        let url = request.url.clone();
        let read_timeout = self.timeouts.read;
        let built = self.build_request(&dial, request);
        let client = self.client.clone();

        Box::pin(async move {
            let req = built?;

            let response = tokio::time::timeout(read_timeout, client.request(req))
                .await
                .map_err(|_| Error::new(Kind::Timeout).with_url(url.clone()))?
                .map_err(|e| {
                    let kind = if e.is_connect() { Kind::Connect } else { Kind::Reset };
                    Error::new(kind).with(e).with_url(url.clone())
                })?;

            let (parts, body) = response.into_parts();
            let body = tokio::time::timeout(read_timeout, body.collect())
                .await
                .map_err(|_| Error::new(Kind::Timeout).with_url(url.clone()))?
                .map_err(|e| Error::new(Kind::Body).with(e).with_url(url))?
                .to_bytes();

            Ok(RawResponse {
                status: parts.status,
                headers: parts.headers,
                body,
            })
        })
    }

    fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Relaxed)
    }

    fn default_timeouts(&self) -> TimeoutConfig {
        self.timeouts
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
