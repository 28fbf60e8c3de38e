//! Logical-target resolution into candidate endpoints.

use std::fmt;
use std::sync::Arc;

use crate::dns::DnsCache;
use crate::error::{Error, Kind};

use super::Endpoint;

/// The abstract destination a caller names: scheme + host + optional port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetAddr {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl TargetAddr {
    #[must_use]
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: Option<u16>) -> Self {
        let scheme = scheme.into();
        let port = port.unwrap_or_else(|| default_port(&scheme));
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Extract the target from an absolute URL.
    pub fn from_url(url: &url::Url) -> Result<Self, Error> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::new(Kind::Builder).with_url(url.clone()))?;
        Ok(Self::new(url.scheme(), host, url.port()))
    }

    /// Registry key for per-target state.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

fn default_port(scheme: &str) -> u16 {
    if scheme.eq_ignore_ascii_case("https") {
        443
    } else {
        80
    }
}

/// Resolves a logical target to an ordered candidate set.
///
/// Resolution failures surface as an empty set: "no candidates" is a
/// balancer-level condition, not an error.
pub enum ServerDirectory {
    /// Fixed endpoint list, parsed once from configuration.
    Static(Vec<Endpoint>),
    /// DNS-backed: every address record becomes one endpoint on the
    /// target's port.
    Dns {
        target: TargetAddr,
        dns: Arc<DnsCache>,
    },
}

impl ServerDirectory {
    /// Parse a `host:port[,host:port...]` list. Malformed entries are
    /// skipped; a missing port defaults to 80.
    #[must_use]
    pub fn parse_server_list(list: &str) -> Vec<Endpoint> {
        list.split(',')
            .filter_map(|entry| {
                let entry = entry.trim();
                let (host, port) = entry.split_once(':')?;
                if host.is_empty() {
                    return None;
                }
                let port = port.parse::<u16>().unwrap_or(80);
                Some(Endpoint::new(host, port))
            })
            .collect()
    }

    /// Resolve the current candidate set. `force` bypasses the DNS cache,
    /// used when every cached endpoint looks unreachable.
    pub async fn resolve(&self, force: bool) -> Vec<Endpoint> {
        match self {
            Self::Static(servers) => servers.clone(),
            Self::Dns { target, dns } => match dns.lookup(&target.host, force).await {
                Ok(addrs) => {
                    let mut servers: Vec<Endpoint> = Vec::with_capacity(addrs.len());
                    for addr in addrs.iter() {
                        let endpoint = Endpoint::new(addr.to_string(), target.port);
                        // DNS answers can repeat across record types.
                        if !servers.contains(&endpoint) {
                            servers.push(endpoint);
                        }
                    }
                    servers
                }
                Err(e) => {
                    tracing::error!(target = %target, error = %e, "server resolution failed");
                    Vec::new()
                }
            },
        }
    }
}
