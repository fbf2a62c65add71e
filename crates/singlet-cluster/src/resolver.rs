//! Service-directory resolution seam.

use async_trait::async_trait;

use crate::error::DiscoveryError;

/// A DNS-capable client resolving a service-directory query into
/// `(port, host)` pairs.
///
/// Injected so deployments can swap in their own directory client and
/// tests can answer from canned data.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Resolve `query` into the current set of `(port, host)` pairs.
    async fn lookup(&self, query: &str) -> Result<Vec<(u16, String)>, DiscoveryError>;
}

/// Resolver backed by the system's DNS via `tokio::net::lookup_host`.
///
/// The query must carry a port (`host:port`); every address record
/// behind the name becomes one `(port, host)` pair.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, query: &str) -> Result<Vec<(u16, String)>, DiscoveryError> {
        let addrs = tokio::net::lookup_host(query)
            .await
            .map_err(|e| DiscoveryError::Resolve {
                query: query.to_string(),
                reason: e.to_string(),
            })?;
        Ok(addrs.map(|addr| (addr.port(), addr.ip().to_string())).collect())
    }
}
