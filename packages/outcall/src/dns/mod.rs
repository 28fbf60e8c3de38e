//! DNS resolution
//!
//! A small [`Resolve`] seam with two implementations (hickory-resolver and
//! getaddrinfo) plus a TTL-bounded answer cache. Negative answers are never
//! cached so a flapping zone recovers as soon as it is healthy again.

pub(crate) mod cache;
pub(crate) mod gai;
pub(crate) mod hickory;

use std::net::IpAddr;

use futures::future::BoxFuture;

use crate::error::Result;

pub use cache::DnsCache;
pub use gai::GaiResolver;
pub use hickory::HickoryResolver;

/// Trait for resolving a hostname to its address records.
pub trait Resolve: Send + Sync + 'static {
    /// Resolve every A/AAAA record for `host`.
    fn lookup<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>>>;
}
