//! Response classification
//!
//! A [`Handler`] turns a buffered transport response into a typed
//! [`InvokeResult`] and decides whether the outcome warrants a retry on
//! business grounds. Transport-level failures never reach a handler; only
//! completed HTTP exchanges do.

use http::StatusCode;

use crate::error::{Error, Kind};
use crate::transport::RawResponse;

/// Outcome of one completed HTTP exchange after classification.
#[derive(Debug)]
pub struct InvokeResult<A> {
    pub status: StatusCode,
    pub body: Option<A>,
    pub failure: Option<Error>,
    pub retry: bool,
}

impl<A> InvokeResult<A> {
    #[must_use]
    pub fn success(status: StatusCode, body: A) -> Self {
        Self {
            status,
            body: Some(body),
            failure: None,
            retry: false,
        }
    }

    #[must_use]
    pub fn failed(status: StatusCode, failure: Error, retry: bool) -> Self {
        Self {
            status,
            body: None,
            failure: Some(failure),
            retry,
        }
    }

    /// Whether classification produced a usable body.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Consume into a `Result`, surfacing the recorded failure.
    pub fn into_body(self) -> crate::error::Result<Option<A>> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.body),
        }
    }
}

/// Classify one completed exchange.
pub trait Handler: Send + Sync + 'static {
    type Output: Send + 'static;

    fn try_complete(&self, response: &RawResponse) -> InvokeResult<Self::Output>;
}

/// Passes the buffered response through untouched.
pub struct RawHandler;

impl Handler for RawHandler {
    type Output = RawResponse;

    fn try_complete(&self, response: &RawResponse) -> InvokeResult<Self::Output> {
        InvokeResult::success(response.status, response.clone())
    }
}

/// Yields the body bytes.
pub struct BytesHandler;

impl Handler for BytesHandler {
    type Output = bytes::Bytes;

    fn try_complete(&self, response: &RawResponse) -> InvokeResult<Self::Output> {
        InvokeResult::success(response.status, response.body.clone())
    }
}

/// Decodes the body as UTF-8 text. A body that fails to decode is flagged
/// for retry: the exchange completed but the payload is unusable, which in
/// practice means a truncated or corrupted read.
pub struct TextHandler;

impl Handler for TextHandler {
    type Output = String;

    fn try_complete(&self, response: &RawResponse) -> InvokeResult<Self::Output> {
        match std::str::from_utf8(&response.body) {
            Ok(text) => InvokeResult::success(response.status, text.to_owned()),
            Err(e) => InvokeResult::failed(
                response.status,
                Error::new(Kind::Body).with(e),
                true,
            ),
        }
    }
}

/// Wraps a handler with a caller-supplied status predicate: matching
/// statuses are flagged as retriable business failures.
pub struct RetryOnStatus<H> {
    inner: H,
    predicate: Box<dyn Fn(StatusCode) -> bool + Send + Sync>,
}

impl<H: Handler> RetryOnStatus<H> {
    pub fn new<F>(inner: H, predicate: F) -> Self
    where
        F: Fn(StatusCode) -> bool + Send + Sync + 'static,
    {
        Self {
            inner,
            predicate: Box::new(predicate),
        }
    }
}

impl<H: Handler> Handler for RetryOnStatus<H> {
    type Output = H::Output;

    fn try_complete(&self, response: &RawResponse) -> InvokeResult<Self::Output> {
        let mut result = self.inner.try_complete(response);
        if (self.predicate)(response.status) {
            result.retry = true;
            result.body = None;
            if result.failure.is_none() {
                result.failure = Some(Error::new(Kind::Status(response.status)));
            }
        }
        result
    }
}
