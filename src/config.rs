//! Configuration for the redirection core
//!
//! JSON configuration covering the ingress hijack set, geo-matching mode,
//! queue capacities, and the selector resolution cache.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Resolver addresses answered locally instead of being proxied.
    /// An unspecified IP hijacks the port on every address.
    #[serde(default)]
    pub dns_hijack: Vec<SocketAddr>,

    /// When true, geo rules compile per-country matchers eagerly;
    /// otherwise they query the shared country database per flow.
    #[serde(default)]
    pub geodata_mode: bool,

    /// Address the fake-IP pool uses as its broadcast, treated as LAN.
    #[serde(default)]
    pub fake_broadcast: Option<IpAddr>,

    /// Country database file for per-query lookups.
    #[serde(default)]
    pub mmdb_path: Option<PathBuf>,

    #[serde(default = "default_tcp_queue_size")]
    pub tcp_queue_size: usize,

    #[serde(default = "default_udp_queue_size")]
    pub udp_queue_size: usize,

    /// Selector resolution cache lifetime, in milliseconds.
    #[serde(default = "default_selector_cache_ms")]
    pub selector_cache_ms: u64,
}

fn default_tcp_queue_size() -> usize {
    200
}

fn default_udp_queue_size() -> usize {
    200
}

fn default_selector_cache_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dns_hijack: Vec::new(),
            geodata_mode: false,
            fake_broadcast: None,
            mmdb_path: None,
            tcp_queue_size: default_tcp_queue_size(),
            udp_queue_size: default_udp_queue_size(),
            selector_cache_ms: default_selector_cache_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json(&content)
    }

    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn selector_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.selector_cache_ms)
    }
}
