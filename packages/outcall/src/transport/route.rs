//! Forward-proxy routing decision.

use std::net::Ipv4Addr;

use crate::balancer::Endpoint;

/// IPv4 subnet in CIDR notation.
#[derive(Debug, Clone, Copy)]
struct Subnet {
    network: u32,
    mask: u32,
}

impl Subnet {
    fn parse(cidr: &str) -> Option<Self> {
        let (addr, prefix) = cidr.split_once('/')?;
        let addr: Ipv4Addr = addr.parse().ok()?;
        let prefix: u32 = prefix.parse().ok()?;
        if prefix > 32 {
            return None;
        }
        let mask = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        };
        Some(Self {
            network: u32::from(addr) & mask,
            mask,
        })
    }

    fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask == self.network
    }
}

/// Decides, per endpoint, whether the connection goes through the forward
/// proxy or directly. Endpoints inside an ignored subnet are dialed
/// directly; everything else is dialed via the proxy, with the logical Host
/// header preserved on the request.
#[derive(Debug, Clone)]
pub struct ProxyRouter {
    proxy: Endpoint,
    ignore: Vec<Subnet>,
}

impl ProxyRouter {
    /// `ignore` entries that fail to parse as IPv4 CIDR are dropped with a
    /// warning.
    #[must_use]
    pub fn new(proxy: Endpoint, ignore: &[String]) -> Self {
        let ignore = ignore
            .iter()
            .filter_map(|cidr| {
                let parsed = Subnet::parse(cidr);
                if parsed.is_none() {
                    tracing::warn!(cidr, "ignoring unparseable proxy-ignore subnet");
                }
                parsed
            })
            .collect();
        Self { proxy, ignore }
    }

    /// The endpoint to actually dial for `endpoint`.
    #[must_use]
    pub fn route(&self, endpoint: &Endpoint) -> Endpoint {
        if let Ok(addr) = endpoint.host().parse::<Ipv4Addr>() {
            if self.ignore.iter().any(|subnet| subnet.contains(addr)) {
                return endpoint.clone();
            }
        }
        self.proxy.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_subnet_is_dialed_directly() {
        let router = ProxyRouter::new(
            Endpoint::new("proxy.internal", 3128),
            &["10.0.0.0/8".to_string()],
        );
        let direct = router.route(&Endpoint::new("10.1.2.3", 80));
        assert_eq!(direct.key(), "10.1.2.3:80");
    }

    #[test]
    fn other_addresses_go_through_proxy() {
        let router = ProxyRouter::new(
            Endpoint::new("proxy.internal", 3128),
            &["10.0.0.0/8".to_string()],
        );
        assert_eq!(
            router.route(&Endpoint::new("93.184.216.34", 80)).key(),
            "proxy.internal:3128"
        );
        // Hostnames cannot be subnet-matched; they are proxied.
        assert_eq!(
            router.route(&Endpoint::new("svc.internal", 80)).key(),
            "proxy.internal:3128"
        );
    }

    #[test]
    fn bad_cidr_entries_are_dropped() {
        let router = ProxyRouter::new(
            Endpoint::new("proxy.internal", 3128),
            &["not-a-subnet".to_string(), "10.0.0.0/99".to_string()],
        );
        assert_eq!(
            router.route(&Endpoint::new("10.1.2.3", 80)).key(),
            "proxy.internal:3128"
        );
    }
}
