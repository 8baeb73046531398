//! Name-resolution relay seam
//!
//! The ingress adapter answers hijacked resolver traffic through this
//! collaborator; its caching and upstream behavior live outside the core.

use async_trait::async_trait;

use crate::common::Result;

/// Relays a raw DNS query and returns the raw reply.
#[async_trait]
pub trait DnsRelay: Send + Sync {
    async fn relay(&self, query: &[u8]) -> Result<Vec<u8>>;
}
