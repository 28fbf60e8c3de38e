//! DNS resolution via the [hickory-resolver](https://github.com/hickory-dns/hickory-dns) crate

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::OnceLock;

use futures::future::BoxFuture;
use hickory_resolver::config::{LookupIpStrategy, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;

use super::Resolve;
use crate::error::{Error, Kind, Result};

/// Resolver backed by hickory-dns.
///
/// Construction of the underlying resolver is delayed until first use so
/// creating the wrapper is free.
#[derive(Debug, Default, Clone)]
pub struct HickoryResolver {
    state: Arc<OnceLock<TokioResolver>>,
}

impl HickoryResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn resolver(&self) -> &TokioResolver {
        self.state.get_or_init(|| {
            let mut builder = TokioResolver::builder_with_config(
                ResolverConfig::default(),
                TokioConnectionProvider::default(),
            );
            // Both families, for "happy eyeballs" style candidate sets.
            builder.options_mut().ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
            builder.build()
        })
    }
}

impl Resolve for HickoryResolver {
    fn lookup<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>>> {
        Box::pin(async move {
            let lookup = self
                .resolver()
                .lookup_ip(host)
                .await
                .map_err(|e| Error::new(Kind::Connect).with(e))?;
            Ok(lookup.iter().collect())
        })
    }
}
