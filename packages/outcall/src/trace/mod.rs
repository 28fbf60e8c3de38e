//! B3 trace propagation
//!
//! Every outbound attempt carries B3 headers so downstream services can
//! stitch the call into the caller's trace. The trace id is fixed for the
//! logical call; each attempt gets its own span id with the previous span
//! recorded as parent.

use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-b3-traceid");
pub const SPAN_ID_HEADER: HeaderName = HeaderName::from_static("x-b3-spanid");
pub const PARENT_SPAN_ID_HEADER: HeaderName = HeaderName::from_static("x-b3-parentspanid");
pub const SAMPLED_HEADER: HeaderName = HeaderName::from_static("x-b3-sampled");

fn random_id() -> String {
    format!("{:016x}", fastrand::u64(1..))
}

/// Trace identity attached to one outbound attempt.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub sampled: bool,
}

impl TraceContext {
    /// Start a fresh trace for a logical call.
    #[must_use]
    pub fn new() -> Self {
        Self {
            trace_id: random_id(),
            span_id: random_id(),
            parent_span_id: None,
            sampled: true,
        }
    }

    /// Continue an inbound trace.
    #[must_use]
    pub fn continued(trace_id: impl Into<String>, parent_span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: random_id(),
            parent_span_id: Some(parent_span_id.into()),
            sampled: true,
        }
    }

    #[must_use]
    pub fn with_sampled(mut self, sampled: bool) -> Self {
        self.sampled = sampled;
        self
    }

    /// A child context for the next attempt: same trace, new span, current
    /// span as parent.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: random_id(),
            parent_span_id: Some(self.span_id.clone()),
            sampled: self.sampled,
        }
    }

    /// Write the B3 headers into an outbound header map, replacing any
    /// previous values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        let insert = |headers: &mut HeaderMap, name: HeaderName, value: &str| {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.insert(name, value);
            }
        };
        insert(headers, TRACE_ID_HEADER, &self.trace_id);
        insert(headers, SPAN_ID_HEADER, &self.span_id);
        if let Some(parent) = &self.parent_span_id {
            insert(headers, PARENT_SPAN_ID_HEADER, parent);
        }
        insert(headers, SAMPLED_HEADER, &self.sampled.to_string());
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}
