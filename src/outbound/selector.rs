//! Selector group: a named outbound whose active proxy is chosen explicitly
//!
//! Resolution queries the providers, applies the group's name filter, and
//! prefers the selected name; when the selection is gone from the candidate
//! list, the first candidate in provider order wins. Resolutions within the
//! cache TTL are coalesced; `set` invalidates the cache immediately.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::common::{Metadata, Single};
use crate::error::{Error, Result};

use super::provider::{collect_proxies, ProxyProvider};
use super::{AdapterType, Connection, PacketConnection, Proxy, ProxyAdapter};

/// Sentinel selection meaning "use the first available candidate".
pub const DEFAULT_SELECTED: &str = "COMPATIBLE";

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5);

pub struct SelectorOptions {
    pub name: String,
    /// Regex restricting which provider-supplied candidates are visible.
    pub filter: Option<String>,
    pub disable_udp: bool,
    pub cache_ttl: Duration,
}

impl SelectorOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: None,
            disable_udp: false,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

pub struct Selector {
    name: String,
    disable_udp: bool,
    filter: Option<Regex>,
    selected: RwLock<String>,
    single: Single<Proxy>,
    providers: Vec<Arc<dyn ProxyProvider>>,
}

impl Selector {
    pub fn new(options: SelectorOptions, providers: Vec<Arc<dyn ProxyProvider>>) -> Result<Self> {
        let filter = options
            .filter
            .as_deref()
            .map(Regex::new)
            .transpose()
            .map_err(|e| Error::Config(format!("invalid filter for group {}: {}", options.name, e)))?;
        Ok(Self {
            name: options.name,
            disable_udp: options.disable_udp,
            filter,
            selected: RwLock::new(DEFAULT_SELECTED.to_string()),
            single: Single::new(options.cache_ttl),
            providers,
        })
    }

    /// Name of the currently resolved candidate. Does not mark it in use.
    pub fn now(&self) -> String {
        self.selected_proxy(false).name().to_string()
    }

    /// Select `name` as the active candidate.
    ///
    /// Fails without state change when `name` is not among the currently
    /// visible candidates; on success the resolution cache is invalidated
    /// so the next resolution picks up the new selection.
    pub fn set(&self, name: &str) -> Result<()> {
        for proxy in collect_proxies(&self.providers, false, self.filter.as_ref()) {
            if proxy.name() == name {
                *self
                    .selected
                    .write()
                    .unwrap_or_else(|e| e.into_inner()) = name.to_string();
                self.single.reset();
                return Ok(());
            }
        }
        Err(Error::ProxyNotFound(name.to_string()))
    }

    fn selected_proxy(&self, touch: bool) -> Proxy {
        self.single.do_cached(|| {
            let proxies = collect_proxies(&self.providers, touch, self.filter.as_ref());
            let selected = self
                .selected
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            proxies
                .iter()
                .find(|p| p.name() == selected)
                .cloned()
                // providers guarantee at least one candidate
                .unwrap_or_else(|| proxies[0].clone())
        })
    }
}

#[async_trait]
impl ProxyAdapter for Selector {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Selector
    }

    fn support_udp(&self) -> bool {
        if self.disable_udp {
            return false;
        }
        self.selected_proxy(false).support_udp()
    }

    async fn dial(&self, metadata: &Metadata) -> Result<Connection> {
        let mut conn = self.selected_proxy(true).dial(metadata).await?;
        conn.append_chain(&self.name);
        Ok(conn)
    }

    async fn listen_packet(&self, metadata: &Metadata) -> Result<PacketConnection> {
        let mut pc = self.selected_proxy(true).listen_packet(metadata).await?;
        pc.append_chain(&self.name);
        Ok(pc)
    }

    fn unwrap(&self, _metadata: &Metadata) -> Option<Proxy> {
        Some(self.selected_proxy(true))
    }

    fn to_json(&self) -> serde_json::Value {
        let all: Vec<String> = collect_proxies(&self.providers, false, self.filter.as_ref())
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        json!({
            "type": self.adapter_type().to_string(),
            "now": self.now(),
            "all": all,
        })
    }
}
