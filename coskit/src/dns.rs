use crate::host::is_internal_host;
use rand::Rng;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::SocketAddr;

/// Resolver that spreads internal-network hosts across their replica
/// addresses.
///
/// All addresses for a host are resolved, and the connection is attempted
/// starting from a random offset, falling back through the remainder. Any
/// other hostname resolves in system order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScatterDns;

impl Resolve for ScatterDns {
    fn resolve(&self, name: Name) -> Resolving {
        let host = name.as_str().to_string();
        Box::pin(async move {
            let mut addrs: Vec<SocketAddr> =
                tokio::net::lookup_host((host.as_str(), 0)).await?.collect();

            if is_internal_host(&host) && addrs.len() > 1 {
                let offset = rand::thread_rng().gen_range(0..addrs.len());
                addrs.rotate_left(offset);
            }

            let iter: Addrs = Box::new(addrs.into_iter());
            Ok(iter)
        })
    }
}
