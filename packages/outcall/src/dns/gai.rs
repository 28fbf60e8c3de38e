//! getaddrinfo-backed resolver, used where the system configuration should
//! decide resolution order.

use std::net::{IpAddr, ToSocketAddrs};

use futures::future::BoxFuture;

use super::Resolve;
use crate::error::{Error, Kind, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct GaiResolver;

impl GaiResolver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for GaiResolver {
    fn lookup<'a>(&'a self, host: &'a str) -> BoxFuture<'a, Result<Vec<IpAddr>>> {
        let host_port = format!("{host}:0");
        Box::pin(async move {
            let addrs = tokio::task::spawn_blocking(move || {
                host_port
                    .to_socket_addrs()
                    .map(|iter| iter.map(|sa| sa.ip()).collect::<Vec<_>>())
            })
            .await
            .map_err(|e| Error::new(Kind::Builder).with(e))?
            .map_err(|e| Error::new(Kind::Connect).with(e))?;
            Ok(addrs)
        })
    }
}
