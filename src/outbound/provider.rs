//! Candidate-providing collaborator seam
//!
//! Providers own the live proxy lists; groups query them on demand and
//! apply their own name filter over the provider-supplied order.

use std::sync::Arc;

use regex::Regex;

use super::Proxy;

/// Supplies the current candidate proxies of a group.
pub trait ProxyProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Current proxies in provider order. `touch` marks them as recently
    /// used for the provider's health-check and keep-alive bookkeeping.
    fn proxies(&self, touch: bool) -> Vec<Proxy>;
}

/// Collect proxies from all providers, preserving provider order and
/// keeping only names accepted by `filter`.
pub fn collect_proxies(
    providers: &[Arc<dyn ProxyProvider>],
    touch: bool,
    filter: Option<&Regex>,
) -> Vec<Proxy> {
    let mut out = Vec::new();
    for provider in providers {
        for proxy in provider.proxies(touch) {
            if filter.map_or(true, |re| re.is_match(proxy.name())) {
                out.push(proxy);
            }
        }
    }
    out
}
