//! Invocation orchestrator
//!
//! Drives one logical call through endpoint selection, breaker gating,
//! transport dispatch, response classification and the retry budget. The
//! same-server budget is consumed once per logical call; once it is spent,
//! each further endpoint gets a single attempt, bounded by the next-server
//! budget. A logical call therefore dispatches at most
//! `1 + max_same + max_next` attempts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::balancer::{Endpoint, LoadBalancer};
use crate::breaker::{BreakerRegistry, BreakerSettings, CircuitBreaker};
use crate::error::{Error, Kind, Result};
use crate::handler::{Handler, InvokeResult};
use crate::retry::RetryPolicy;
use crate::trace::TraceContext;
use crate::transport::{PreparedRequest, Transport};

/// Per-call attempt bookkeeping.
///
/// `server_attempt_count` counts consecutive attempts against the current
/// endpoint and resets to zero whenever the endpoint changes;
/// `attempt_count` only grows.
#[derive(Debug)]
struct AttemptContext {
    attempt_count: u32,
    server_attempt_count: u32,
    current_endpoint: Option<Endpoint>,
    started_at: Instant,
}

impl AttemptContext {
    fn new() -> Self {
        Self {
            attempt_count: 0,
            server_attempt_count: 0,
            current_endpoint: None,
            started_at: Instant::now(),
        }
    }

    fn pin(&mut self, endpoint: &Endpoint) {
        if self.current_endpoint.as_ref() != Some(endpoint) {
            self.server_attempt_count = 0;
            self.current_endpoint = Some(endpoint.clone());
        }
        self.attempt_count += 1;
        self.server_attempt_count += 1;
    }

    fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Builds an [`Invoker`]. Transport and handler are required; exactly one
/// of a balancer or a pinned endpoint must be supplied.
pub struct InvokerBuilder<H> {
    transport: Arc<dyn Transport>,
    handler: H,
    balancer: Option<Arc<LoadBalancer>>,
    pinned: Option<Endpoint>,
    breakers: Option<Arc<BreakerRegistry>>,
    policy: Option<RetryPolicy>,
    trace: Option<TraceContext>,
    budget: Option<Duration>,
}

impl<H: Handler> InvokerBuilder<H> {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, handler: H) -> Self {
        Self {
            transport,
            handler,
            balancer: None,
            pinned: None,
            breakers: None,
            policy: None,
            trace: None,
            budget: None,
        }
    }

    #[must_use]
    pub fn balancer(mut self, balancer: Arc<LoadBalancer>) -> Self {
        self.balancer = Some(balancer);
        self
    }

    /// Pin every attempt to one endpoint, bypassing selection. Next-server
    /// retries are impossible with a pinned endpoint.
    #[must_use]
    pub fn pinned(mut self, endpoint: Endpoint) -> Self {
        self.pinned = Some(endpoint);
        self
    }

    #[must_use]
    pub fn breakers(mut self, breakers: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(breakers);
        self
    }

    #[must_use]
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    #[must_use]
    pub fn trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Overall wall-clock budget across all attempts. Defaults to the
    /// transport's connect + read + queue timeouts.
    #[must_use]
    pub fn budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn build(self) -> Result<Invoker<H>> {
        if self.balancer.is_none() && self.pinned.is_none() {
            return Err(Error::new(Kind::Builder)
                .with(std::io::Error::other("neither balancer nor pinned endpoint set")));
        }
        let budget = self
            .budget
            .unwrap_or_else(|| self.transport.default_timeouts().total());
        Ok(Invoker {
            transport: self.transport,
            handler: self.handler,
            balancer: self.balancer,
            pinned: self.pinned,
            breakers: self
                .breakers
                .unwrap_or_else(|| Arc::new(BreakerRegistry::new(BreakerSettings::default()))),
            policy: self.policy.unwrap_or_default(),
            trace: self.trace.unwrap_or_default(),
            budget,
        })
    }
}

/// Executes logical calls with balancing, breaker gating and retries.
pub struct Invoker<H> {
    transport: Arc<dyn Transport>,
    handler: H,
    balancer: Option<Arc<LoadBalancer>>,
    pinned: Option<Endpoint>,
    breakers: Arc<BreakerRegistry>,
    policy: RetryPolicy,
    trace: TraceContext,
    budget: Duration,
}

enum Next {
    SameServer,
    NextServer,
    GiveUp,
}

impl<H: Handler> Invoker<H> {
    /// Run one logical call to completion.
    ///
    /// `Err` carries the terminal transport or selection failure; `Ok`
    /// carries the classified result of the last completed exchange, which
    /// may itself record a business failure.
    pub async fn invoke(&self, request: PreparedRequest) -> Result<InvokeResult<H::Output>> {
        let mut ctx = AttemptContext::new();
        let mut trace = self.trace.clone();
        let mut same_used: u32 = 0;
        let mut next_used: u32 = 0;
        let mut reuse: Option<Endpoint> = None;

        loop {
            let endpoint = match reuse.take() {
                Some(endpoint) => endpoint,
                None => self.select_endpoint(&request)?,
            };

            let breaker = self.breakers.get(&endpoint.key());
            if !breaker.allow_request() {
                let denied = Error::new(Kind::CircuitOpen).with_url(request.url.clone());
                tracing::debug!(server = %endpoint, "circuit open, request denied");
                // A denial never reaches the transport and does not count
                // as an attempt; retrying the same endpoint would be denied
                // again, so only the next-server budget applies.
                match self.after_denial(&ctx, next_used) {
                    Some(used) => {
                        next_used = used;
                        trace = trace.child();
                        continue;
                    }
                    None => return Err(denied),
                }
            }
            ctx.pin(&endpoint);

            if ctx.attempt_count > 1 {
                trace = trace.child();
            }
            let mut attempt = request.clone();
            trace.apply(&mut attempt.headers);

            let span = tracing::debug_span!(
                "invoke_attempt",
                server = %endpoint,
                attempt = ctx.attempt_count,
                status = tracing::field::Empty,
                error = tracing::field::Empty,
            );
            let outcome = self
                .transport
                .execute(&endpoint, &attempt)
                .instrument(span.clone())
                .await;

            match outcome {
                Ok(response) => {
                    let result = self.handler.try_complete(&response);
                    span.record("status", u64::from(result.status.as_u16()));
                    if !result.retry {
                        breaker.mark_success();
                        tracing::debug!(server = %endpoint, status = %result.status, "invocation complete");
                        return Ok(result);
                    }
                    // Business retry: the exchange completed, so the breaker
                    // is not marked either way.
                    tracing::debug!(server = %endpoint, status = %result.status, "handler flagged retry");
                    match self.next_step(&ctx, same_used, next_used, self.policy.enabled()) {
                        Next::SameServer => {
                            same_used += 1;
                            reuse = Some(endpoint);
                        }
                        Next::NextServer => next_used += 1,
                        Next::GiveUp => return Ok(result),
                    }
                }
                Err(error) => {
                    span.record("error", tracing::field::debug(error.kind()));
                    Self::mark_breaker(&breaker, &error);
                    tracing::debug!(server = %endpoint, error = %error, "attempt failed");
                    match self.next_step(&ctx, same_used, next_used, self.policy.should_retry(&error)) {
                        Next::SameServer => {
                            same_used += 1;
                            reuse = Some(endpoint);
                        }
                        Next::NextServer => next_used += 1,
                        Next::GiveUp => return Err(error),
                    }
                }
            }
        }
    }

    /// Like [`invoke`](Self::invoke) but bounded by a hard deadline; an
    /// in-flight attempt at expiry is discarded and the call fails with
    /// [`Kind::Timeout`].
    pub async fn invoke_with_deadline(
        &self,
        request: PreparedRequest,
        deadline: Duration,
    ) -> Result<InvokeResult<H::Output>> {
        let url = request.url.clone();
        match tokio::time::timeout(deadline, self.invoke(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::new(Kind::Timeout).with_url(url)),
        }
    }

    fn select_endpoint(&self, request: &PreparedRequest) -> Result<Endpoint> {
        if let Some(endpoint) = &self.pinned {
            return Ok(endpoint.clone());
        }
        match self.balancer.as_ref().and_then(|b| b.choose_server()) {
            Some(endpoint) => Ok(endpoint),
            // No candidates is terminal: retrying selection cannot help
            // within one call's budget.
            None => Err(Error::new(Kind::NoEndpoint).with_url(request.url.clone())),
        }
    }

    fn mark_breaker(breaker: &CircuitBreaker, error: &Error) {
        if error.is_timeout() {
            breaker.mark_timeout();
        } else if error.is_pool_rejected() {
            breaker.mark_rejected();
        } else {
            breaker.mark_failure();
        }
    }

    /// Budget consultation after a circuit denial: next-server only.
    fn after_denial(&self, ctx: &AttemptContext, next_used: u32) -> Option<u32> {
        if !self.policy.enabled()
            || self.pinned.is_some()
            || next_used >= self.policy.max_retries_next_server()
            || ctx.elapsed() >= self.budget
        {
            return None;
        }
        Some(next_used + 1)
    }

    fn next_step(&self, ctx: &AttemptContext, same_used: u32, next_used: u32, retriable: bool) -> Next {
        if !retriable || ctx.elapsed() >= self.budget {
            return Next::GiveUp;
        }
        if same_used < self.policy.max_retries_same_server() {
            return Next::SameServer;
        }
        if self.pinned.is_none() && next_used < self.policy.max_retries_next_server() {
            return Next::NextServer;
        }
        Next::GiveUp
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures::future::BoxFuture;
    use http::StatusCode;

    use super::*;
    use crate::breaker::rolling::now_ms;
    use crate::handler::{BytesHandler, RetryOnStatus};
    use crate::trace::{PARENT_SPAN_ID_HEADER, TRACE_ID_HEADER};
    use crate::transport::{RawResponse, TimeoutConfig};

    enum Scripted {
        Ok(StatusCode, &'static [u8]),
        Fail(Kind),
    }

    #[derive(Clone)]
    struct SeenCall {
        server: String,
        trace_id: Option<String>,
        parent_span_id: Option<String>,
    }

    struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        calls: Mutex<Vec<SeenCall>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Scripted>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<SeenCall> {
            self.calls.lock().unwrap().clone()
        }

        fn servers(&self) -> Vec<String> {
            self.calls().into_iter().map(|call| call.server).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(
            &self,
            endpoint: &Endpoint,
            request: &PreparedRequest,
        ) -> BoxFuture<'static, Result<RawResponse>> {
            let header = |name: &http::header::HeaderName| {
                request
                    .headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_owned)
            };
            self.calls.lock().unwrap().push(SeenCall {
                server: endpoint.key(),
                trace_id: header(&TRACE_ID_HEADER),
                parent_span_id: header(&PARENT_SPAN_ID_HEADER),
            });
            let step = self.script.lock().unwrap().pop_front();
            Box::pin(async move {
                match step {
                    Some(Scripted::Ok(status, body)) => Ok(RawResponse {
                        status,
                        headers: http::HeaderMap::new(),
                        body: bytes::Bytes::from_static(body),
                    }),
                    Some(Scripted::Fail(kind)) => Err(Error::new(kind)),
                    None => Ok(RawResponse {
                        status: StatusCode::OK,
                        headers: http::HeaderMap::new(),
                        body: bytes::Bytes::new(),
                    }),
                }
            })
        }

        fn last_access_ms(&self) -> u64 {
            now_ms()
        }

        fn default_timeouts(&self) -> TimeoutConfig {
            TimeoutConfig {
                connect: Duration::from_secs(5),
                read: Duration::from_secs(5),
                queue: Duration::from_secs(5),
            }
        }

        fn close(&self) {}
    }

    fn request() -> PreparedRequest {
        PreparedRequest::get(url::Url::parse("http://svc.internal/api").unwrap())
    }

    fn balancer(hosts: &[&str]) -> Arc<LoadBalancer> {
        LoadBalancer::fixed(hosts.iter().map(|h| Endpoint::new(*h, 80)).collect())
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let transport = ScriptedTransport::new(vec![Scripted::Ok(StatusCode::OK, b"payload")]);
        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a"]))
            .build()
            .unwrap();

        let result = invoker.invoke(request()).await.unwrap();
        assert_eq!(result.status, StatusCode::OK);
        assert_eq!(result.body.as_deref(), Some(&b"payload"[..]));
        assert_eq!(transport.servers(), vec!["a:80"]);
    }

    #[tokio::test]
    async fn same_server_budget_is_spent_before_rotating() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail(Kind::Connect),
            Scripted::Fail(Kind::Connect),
            Scripted::Ok(StatusCode::OK, b"ok"),
        ]);
        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a", "b"]))
            .retry(RetryPolicy::new(1, 1, true))
            .build()
            .unwrap();

        let result = invoker.invoke(request()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(transport.servers(), vec!["a:80", "a:80", "b:80"]);
    }

    #[tokio::test]
    async fn single_endpoint_connection_refused_gets_exactly_two_attempts() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail(Kind::Connect),
            Scripted::Fail(Kind::Connect),
        ]);
        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a"]))
            .retry(RetryPolicy::new(1, 0, true))
            .build()
            .unwrap();

        let error = invoker.invoke(request()).await.unwrap_err();
        assert!(error.is_connect());
        assert_eq!(transport.servers(), vec!["a:80", "a:80"]);
    }

    #[tokio::test]
    async fn attempts_are_bounded_and_final_error_surfaces() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail(Kind::Connect),
            Scripted::Fail(Kind::Connect),
            Scripted::Fail(Kind::Connect),
            Scripted::Fail(Kind::Connect),
        ]);
        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a", "b"]))
            .retry(RetryPolicy::new(1, 1, true))
            .build()
            .unwrap();

        let error = invoker.invoke(request()).await.unwrap_err();
        assert!(error.is_connect());
        // 1 + max_same + max_next
        assert_eq!(transport.servers().len(), 3);
    }

    #[tokio::test]
    async fn non_retriable_failure_is_terminal() {
        let transport = ScriptedTransport::new(vec![Scripted::Fail(Kind::Body)]);
        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a", "b"]))
            .retry(RetryPolicy::new(2, 2, true))
            .build()
            .unwrap();

        let error = invoker.invoke(request()).await.unwrap_err();
        assert!(error.is_body());
        assert_eq!(transport.servers().len(), 1);
    }

    #[tokio::test]
    async fn circuit_tripping_timeout_fails_over() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail(Kind::Timeout),
            Scripted::Ok(StatusCode::OK, b"ok"),
        ]);
        let breakers = Arc::new(BreakerRegistry::new(BreakerSettings::default()));
        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a", "b"]))
            .breakers(breakers.clone())
            .retry(RetryPolicy::new(0, 1, true))
            .build()
            .unwrap();

        let result = invoker.invoke(request()).await.unwrap();
        assert!(result.is_success());
        // Timeout is not in the retriable set, but it trips the circuit, so
        // the call still moves to the next endpoint.
        assert_eq!(transport.servers(), vec!["a:80", "b:80"]);
        assert_eq!(breakers.get("a:80").health_counts().error, 1);
    }

    #[tokio::test]
    async fn custom_circuit_related_kind_fails_over() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail(Kind::Body),
            Scripted::Ok(StatusCode::OK, b"ok"),
        ]);
        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a", "b"]))
            .retry(RetryPolicy::new(0, 1, true).add_circuit_related(Kind::Body))
            .build()
            .unwrap();

        let result = invoker.invoke(request()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(transport.servers(), vec!["a:80", "b:80"]);
    }

    #[tokio::test]
    async fn open_circuit_is_denied_without_dispatch() {
        let transport = ScriptedTransport::new(vec![Scripted::Ok(StatusCode::OK, b"ok")]);
        let breakers = Arc::new(BreakerRegistry::new(BreakerSettings::default()));
        breakers.get("a:80").set_force_open(true);

        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a", "b"]))
            .breakers(breakers)
            .retry(RetryPolicy::new(1, 1, true))
            .build()
            .unwrap();

        let result = invoker.invoke(request()).await.unwrap();
        assert!(result.is_success());
        // The denied endpoint never reached the transport.
        assert_eq!(transport.servers(), vec!["b:80"]);
    }

    #[tokio::test]
    async fn denial_without_next_budget_surfaces_circuit_open() {
        let transport = ScriptedTransport::new(vec![]);
        let breakers = Arc::new(BreakerRegistry::new(BreakerSettings::default()));
        breakers.get("a:80").set_force_open(true);

        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a"]))
            .breakers(breakers)
            .retry(RetryPolicy::new(1, 0, true))
            .build()
            .unwrap();

        let error = invoker.invoke(request()).await.unwrap_err();
        assert!(error.is_circuit_open());
        assert!(transport.servers().is_empty());
    }

    #[tokio::test]
    async fn business_retry_rotates_without_breaker_marks() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Ok(StatusCode::BAD_GATEWAY, b"bad"),
            Scripted::Ok(StatusCode::OK, b"good"),
        ]);
        let breakers = Arc::new(BreakerRegistry::new(BreakerSettings::default()));
        let handler =
            RetryOnStatus::new(BytesHandler, |status: StatusCode| status.is_server_error());
        let invoker = InvokerBuilder::new(transport.clone(), handler)
            .balancer(balancer(&["a", "b"]))
            .breakers(breakers.clone())
            .retry(RetryPolicy::new(0, 1, true))
            .build()
            .unwrap();

        let result = invoker.invoke(request()).await.unwrap();
        assert!(result.is_success());
        assert_eq!(transport.servers(), vec!["a:80", "b:80"]);
        // Neither the 502 nor the retry decision marked the breaker.
        assert_eq!(breakers.get("a:80").health_counts().total, 0);
    }

    #[tokio::test]
    async fn empty_balancer_is_no_endpoint() {
        let transport = ScriptedTransport::new(vec![]);
        let invoker = InvokerBuilder::new(transport, BytesHandler)
            .balancer(LoadBalancer::fixed(Vec::new()))
            .build()
            .unwrap();

        let error = invoker.invoke(request()).await.unwrap_err();
        assert!(error.is_no_endpoint());
    }

    #[tokio::test]
    async fn trace_headers_change_span_per_attempt() {
        let transport = ScriptedTransport::new(vec![
            Scripted::Fail(Kind::Connect),
            Scripted::Ok(StatusCode::OK, b"ok"),
        ]);
        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a"]))
            .retry(RetryPolicy::new(1, 0, true))
            .build()
            .unwrap();

        invoker.invoke(request()).await.unwrap();
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        // Same trace id propagated on both attempts.
        assert!(calls[0].trace_id.is_some());
        assert_eq!(calls[0].trace_id, calls[1].trace_id);
    }

    #[tokio::test]
    async fn denied_endpoint_does_not_advance_attempt_numbering() {
        let transport = ScriptedTransport::new(vec![Scripted::Ok(StatusCode::OK, b"ok")]);
        let breakers = Arc::new(BreakerRegistry::new(BreakerSettings::default()));
        breakers.get("a:80").set_force_open(true);

        let root = TraceContext::new();
        let root_span = root.span_id.clone();
        let invoker = InvokerBuilder::new(transport.clone(), BytesHandler)
            .balancer(balancer(&["a", "b"]))
            .breakers(breakers)
            .retry(RetryPolicy::new(1, 1, true))
            .trace(root)
            .build()
            .unwrap();

        invoker.invoke(request()).await.unwrap();

        // The denial rotated the span once; the dispatched attempt is the
        // first real one, so its parent is the root span.
        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].server, "b:80");
        assert_eq!(calls[0].parent_span_id.as_deref(), Some(root_span.as_str()));
    }

    #[tokio::test]
    async fn attempt_span_records_outcome() {
        use std::sync::atomic::{AtomicU64, Ordering};

        struct SpanCapture {
            fields: Arc<Mutex<Vec<String>>>,
            next_id: AtomicU64,
        }

        struct FieldCollector<'a>(&'a mut Vec<String>);

        impl tracing::field::Visit for FieldCollector<'_> {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                self.0.push(format!("{}={:?}", field.name(), value));
            }
        }

        impl tracing::Subscriber for SpanCapture {
            fn enabled(&self, _metadata: &tracing::Metadata<'_>) -> bool {
                true
            }

            fn new_span(&self, span: &tracing::span::Attributes<'_>) -> tracing::span::Id {
                span.record(&mut FieldCollector(&mut self.fields.lock().unwrap()));
                tracing::span::Id::from_u64(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
            }

            fn record(&self, _span: &tracing::span::Id, values: &tracing::span::Record<'_>) {
                values.record(&mut FieldCollector(&mut self.fields.lock().unwrap()));
            }

            fn record_follows_from(&self, _span: &tracing::span::Id, _follows: &tracing::span::Id) {}

            fn event(&self, _event: &tracing::Event<'_>) {}

            fn enter(&self, _span: &tracing::span::Id) {}

            fn exit(&self, _span: &tracing::span::Id) {}
        }

        let fields = Arc::new(Mutex::new(Vec::new()));
        let _guard = tracing::subscriber::set_default(SpanCapture {
            fields: fields.clone(),
            next_id: AtomicU64::new(0),
        });

        let transport = ScriptedTransport::new(vec![
            Scripted::Fail(Kind::Connect),
            Scripted::Ok(StatusCode::OK, b"ok"),
        ]);
        let invoker = InvokerBuilder::new(transport, BytesHandler)
            .balancer(balancer(&["a"]))
            .retry(RetryPolicy::new(1, 0, true))
            .build()
            .unwrap();

        invoker.invoke(request()).await.unwrap();

        // Both outcomes land on the attempt span, not just in events.
        let fields = fields.lock().unwrap();
        assert!(fields.iter().any(|f| f == "error=Connect"), "{fields:?}");
        assert!(fields.iter().any(|f| f == "status=200"), "{fields:?}");
    }

    #[tokio::test]
    async fn deadline_discards_inflight_attempt() {
        struct HangingTransport;

        impl Transport for HangingTransport {
            fn execute(
                &self,
                _endpoint: &Endpoint,
                _request: &PreparedRequest,
            ) -> BoxFuture<'static, Result<RawResponse>> {
                Box::pin(async {
                    futures::future::pending::<()>().await;
                    unreachable!()
                })
            }

            fn last_access_ms(&self) -> u64 {
                now_ms()
            }

            fn default_timeouts(&self) -> TimeoutConfig {
                TimeoutConfig {
                    connect: Duration::from_secs(5),
                    read: Duration::from_secs(5),
                    queue: Duration::from_secs(5),
                }
            }

            fn close(&self) {}
        }

        let invoker = InvokerBuilder::new(Arc::new(HangingTransport), BytesHandler)
            .balancer(balancer(&["a"]))
            .build()
            .unwrap();

        let error = invoker
            .invoke_with_deadline(request(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(error.is_timeout());
    }

    #[tokio::test]
    async fn builder_requires_a_target() {
        let transport = ScriptedTransport::new(vec![]);
        assert!(InvokerBuilder::new(transport, BytesHandler).build().is_err());
    }
}
