//! Geo reference data seams
//!
//! Two backends serve geo rules:
//! - [`CountryLookup`]: a shared, read-only country database queried per
//!   flow (backed here by an mmdb reader, injected as an `Arc` by whoever
//!   loads it)
//! - [`CountryMatcher`]: CIDR ranges for one country, compiled eagerly at
//!   rule construction from a [`GeoDataLoader`]

use std::net::IpAddr;
use std::path::Path;

use ipnet::IpNet;

use crate::error::{Error, Result};

/// Per-query country database handle.
pub trait CountryLookup: Send + Sync {
    /// ISO 3166-1 alpha-2 code for the IP, if known.
    fn country(&self, ip: IpAddr) -> Option<String>;
}

/// Country database backed by a MaxMind mmdb file.
pub struct CountryDb {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl CountryDb {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = maxminddb::Reader::open_readfile(path.as_ref())
            .map_err(|e| Error::Config(format!("failed to open mmdb {:?}: {}", path.as_ref(), e)))?;
        Ok(Self { reader })
    }
}

impl CountryLookup for CountryDb {
    fn country(&self, ip: IpAddr) -> Option<String> {
        self.reader
            .lookup::<maxminddb::geoip2::Country>(ip)
            .ok()
            .and_then(|record| record.country)
            .and_then(|country| country.iso_code)
            .map(str::to_string)
    }
}

/// Supplies the CIDR ranges of a country for eager compilation.
pub trait GeoDataLoader: Send + Sync {
    fn load(&self, country: &str) -> Result<Vec<IpNet>>;
}

/// Immutable per-country CIDR matcher, built once at rule construction.
pub struct CountryMatcher {
    country: String,
    cidrs: Vec<IpNet>,
}

impl CountryMatcher {
    pub fn compile(loader: &dyn GeoDataLoader, country: &str) -> Result<Self> {
        let cidrs = loader.load(country).map_err(|e| Error::GeoDataLoad {
            country: country.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            country: country.to_ascii_uppercase(),
            cidrs,
        })
    }

    /// Matcher that never matches; used for sentinel countries that are
    /// evaluated directly instead of against reference data.
    pub fn empty(country: &str) -> Self {
        Self {
            country: country.to_ascii_uppercase(),
            cidrs: Vec::new(),
        }
    }

    pub fn match_ip(&self, ip: IpAddr) -> bool {
        self.cidrs.iter().any(|net| net.contains(&ip))
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn record_count(&self) -> usize {
        self.cidrs.len()
    }
}
