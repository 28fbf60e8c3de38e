use std::error::Error as StdError;
use std::fmt;

use http::StatusCode;

/// A Result alias where the Err case is `outcall::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while invoking a remote peer.
#[derive(Clone)]
pub struct Error {
    pub(crate) inner: Box<Inner>,
}

pub(crate) struct Inner {
    pub(crate) kind: Kind,
    pub(crate) source: Option<Box<dyn StdError + Send + Sync>>,
    pub(crate) url: Option<url::Url>,
}

impl Clone for Inner {
    fn clone(&self) -> Self {
        Inner {
            kind: self.kind,
            // Trait objects cannot be cloned; the kind survives.
            source: None,
            url: self.url.clone(),
        }
    }
}

/// Failure classification for one invocation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// The load balancer produced no candidate endpoint.
    NoEndpoint,
    /// The per-endpoint circuit breaker denied the request.
    CircuitOpen,
    /// Connection establishment failed (refused, unreachable).
    Connect,
    /// An established connection was closed or reset mid-request.
    Reset,
    /// Connect, read or overall deadline exceeded.
    Timeout,
    /// The isolated worker pool rejected the request (queue full or
    /// queue-wait deadline exceeded).
    PoolRejected,
    /// The response carried a terminal HTTP status.
    Status(StatusCode),
    /// Reading or decoding the response body failed.
    Body,
    /// The request could not be constructed.
    Builder,
}

impl Error {
    pub fn new(kind: Kind) -> Error {
        Error {
            inner: Box::new(Inner {
                kind,
                source: None,
                url: None,
            }),
        }
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with<E: Into<Box<dyn StdError + Send + Sync>>>(mut self, source: E) -> Error {
        self.inner.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_url(mut self, url: url::Url) -> Self {
        self.inner.url = Some(url);
        self
    }

    pub(crate) fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// The URL the failing invocation targeted, when known.
    #[must_use]
    pub fn url(&self) -> Option<&url::Url> {
        self.inner.url.as_ref()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("outcall::Error");

        f.field("kind", &self.inner.kind);

        if let Some(ref source) = self.inner.source {
            f.field("source", source);
        }

        if let Some(ref url) = self.inner.url {
            f.field("url", url);
        }

        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            Kind::NoEndpoint => f.write_str("no live endpoint available"),
            Kind::CircuitOpen => f.write_str("circuit breaker is open"),
            Kind::Connect => f.write_str("connection error"),
            Kind::Reset => f.write_str("connection closed or reset"),
            Kind::Timeout => f.write_str("request timeout"),
            Kind::PoolRejected => f.write_str("worker pool rejected request"),
            Kind::Status(code) => {
                let prefix = if code.is_client_error() {
                    "HTTP status client error"
                } else {
                    "HTTP status server error"
                };
                write!(f, "{prefix} ({code})")
            }
            Kind::Body => f.write_str("request or response body error"),
            Kind::Builder => f.write_str("builder error"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner
            .source
            .as_ref()
            .map(|err| &**err as &(dyn StdError + 'static))
    }
}
