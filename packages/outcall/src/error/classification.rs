use std::error::Error as StdError;
use std::io;

use super::types::{Error, Kind};

/// Bound on cause-chain traversal so self-referential sources cannot loop.
const MAX_CAUSE_DEPTH: usize = 5;

impl Error {
    /// Returns true if no candidate endpoint was available.
    #[must_use]
    pub fn is_no_endpoint(&self) -> bool {
        matches!(self.inner.kind, Kind::NoEndpoint)
    }

    /// Returns true if the circuit breaker denied the request.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self.inner.kind, Kind::CircuitOpen)
    }

    /// Returns true if the error is related to connection establishment,
    /// either directly or through its cause chain.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        if matches!(self.inner.kind, Kind::Connect) {
            return true;
        }
        self.cause_chain_has(|io| {
            matches!(
                io.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotConnected
            )
        })
    }

    /// Returns true if the connection was closed or reset mid-request.
    #[must_use]
    pub fn is_reset(&self) -> bool {
        if matches!(self.inner.kind, Kind::Reset) {
            return true;
        }
        self.cause_chain_has(|io| {
            matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            )
        })
    }

    /// Returns true if the error is related to a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        if matches!(self.inner.kind, Kind::Timeout) {
            return true;
        }
        self.cause_chain_has(|io| io.kind() == io::ErrorKind::TimedOut)
    }

    /// Returns true if the worker pool rejected the request.
    #[must_use]
    pub fn is_pool_rejected(&self) -> bool {
        matches!(self.inner.kind, Kind::PoolRejected)
    }

    /// Returns true if the error carries a terminal HTTP status.
    #[must_use]
    pub fn is_status(&self) -> bool {
        matches!(self.inner.kind, Kind::Status(_))
    }

    /// Returns true if the error is related to the response body.
    #[must_use]
    pub fn is_body(&self) -> bool {
        matches!(self.inner.kind, Kind::Body)
    }

    /// Returns the status code, if the error was generated from a response.
    #[must_use]
    pub fn status(&self) -> Option<http::StatusCode> {
        match self.inner.kind {
            Kind::Status(code) => Some(code),
            _ => None,
        }
    }

    /// Walk the source chain, depth-bounded, looking for an `io::Error`
    /// matching the predicate.
    fn cause_chain_has(&self, pred: impl Fn(&io::Error) -> bool) -> bool {
        let mut source = self.source();
        let mut depth = MAX_CAUSE_DEPTH;

        while let Some(err) = source {
            if depth == 0 {
                return false;
            }
            depth -= 1;
            if let Some(io) = err.downcast_ref::<io::Error>() {
                if pred(io) {
                    return true;
                }
            }
            if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
                if hyper_err.is_timeout() && pred(&io::Error::from(io::ErrorKind::TimedOut)) {
                    return true;
                }
                if hyper_err.is_incomplete_message()
                    && pred(&io::Error::from(io::ErrorKind::UnexpectedEof))
                {
                    return true;
                }
            }
            source = err.source();
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_predicates() {
        assert!(Error::new(Kind::NoEndpoint).is_no_endpoint());
        assert!(Error::new(Kind::CircuitOpen).is_circuit_open());
        assert!(Error::new(Kind::Timeout).is_timeout());
        assert!(!Error::new(Kind::Timeout).is_connect());
    }

    #[test]
    fn connect_found_in_cause_chain() {
        let io = io::Error::from(io::ErrorKind::ConnectionRefused);
        let err = Error::new(Kind::Builder).with(io);
        assert!(err.is_connect());
        assert!(!err.is_reset());
    }

    #[test]
    fn status_extraction() {
        let err = Error::new(Kind::Status(http::StatusCode::BAD_GATEWAY));
        assert_eq!(err.status(), Some(http::StatusCode::BAD_GATEWAY));
        assert!(err.is_status());
    }
}
