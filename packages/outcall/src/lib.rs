//! # Outcall
//!
//! Resilient outbound HTTP invocation: a DNS-backed server directory,
//! round-robin load balancing, per-endpoint circuit breakers with rolling
//! failure windows, pooled and worker-pool-isolated transports, response
//! classification with business-level retry, and an orchestrator that ties
//! them together under a global wall-clock budget.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use outcall::balancer::{LoadBalancer, ServerDirectory};
//! use outcall::handler::TextHandler;
//! use outcall::invoker::InvokerBuilder;
//! use outcall::transport::PreparedRequest;
//!
//! # async fn run() -> outcall::Result<()> {
//! let balancer = LoadBalancer::fixed(ServerDirectory::parse_server_list(
//!     "10.0.0.1:8080,10.0.0.2:8080",
//! ));
//! let invoker = InvokerBuilder::new(outcall::global_transport(), TextHandler)
//!     .balancer(balancer)
//!     .build()?;
//!
//! let url = url::Url::parse("http://svc.internal/api/v1/things").map_err(|e| {
//!     outcall::Error::new(outcall::Kind::Builder).with(e)
//! })?;
//! let result = invoker.invoke(PreparedRequest::get(url)).await?;
//! println!("{:?}", result.body);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::OnceLock;

pub mod balancer;
pub mod breaker;
pub mod config;
pub mod dns;
pub mod error;
pub mod handler;
pub mod invoker;
pub mod retry;
pub mod targets;
pub mod trace;
pub mod transport;

pub use crate::config::InvokeConfig;
pub use crate::error::{Error, Kind, Result};
pub use crate::handler::{Handler, InvokeResult};
pub use crate::invoker::{Invoker, InvokerBuilder};
pub use crate::retry::RetryPolicy;
pub use crate::trace::TraceContext;
pub use crate::transport::{PooledTransport, PreparedRequest, RawResponse, Transport};

static GLOBAL_TRANSPORT: OnceLock<Arc<dyn Transport>> = OnceLock::new();

/// The process-wide shared transport: a pooled client behind worker-pool
/// isolation, built from [`InvokeConfig::default`] on first use.
pub fn global_transport() -> Arc<dyn Transport> {
    GLOBAL_TRANSPORT
        .get_or_init(|| build_transport(&InvokeConfig::default()))
        .clone()
}

/// Initialize the global transport with custom configuration. Must be
/// called before the first [`global_transport`] use; later calls are
/// ignored with a warning. An invalid configuration falls back to the
/// defaults rather than failing the caller.
pub fn init_global_transport(config: InvokeConfig) {
    let config = match config.validate() {
        Ok(()) => config,
        Err(reason) => {
            tracing::error!(%reason, "invalid invoke configuration, using defaults");
            InvokeConfig::default()
        }
    };
    if GLOBAL_TRANSPORT.set(build_transport(&config)).is_err() {
        tracing::warn!("global transport already initialized, configuration ignored");
    }
}

fn build_transport(config: &InvokeConfig) -> Arc<dyn Transport> {
    let pooled = Arc::new(PooledTransport::new(config));
    Arc::new(transport::IsolatedTransport::new(
        pooled,
        config.max_total_connections,
        config.request_queue_timeout,
    ))
}
