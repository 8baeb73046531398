//! GeoIP rule: match flows by destination country
//!
//! Two backends, chosen at construction: a shared per-query country
//! database, or a per-country CIDR matcher compiled eagerly when the rule
//! is built. The literal country `"LAN"` is a sentinel matched directly
//! against the IP, with no reference data involved.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::info;

use crate::common::Metadata;
use crate::error::Result;
use crate::geodata::{CountryLookup, CountryMatcher, GeoDataLoader};

use super::{Rule, RuleType};

const LAN_SENTINEL: &str = "LAN";

/// Which geo backend a rule is built against.
pub enum GeoSource {
    /// Shared read-only country database, queried per flow.
    Database(Arc<dyn CountryLookup>),
    /// Loader for eager per-country CIDR compilation.
    Compiled(Arc<dyn GeoDataLoader>),
}

enum Backend {
    Database(Arc<dyn CountryLookup>),
    Compiled(CountryMatcher),
}

pub struct GeoIpRule {
    country: String,
    adapter: String,
    no_resolve: bool,
    fake_broadcast: Option<IpAddr>,
    backend: Backend,
}

impl GeoIpRule {
    /// Build a geo rule.
    ///
    /// With [`GeoSource::Compiled`] the country matcher is loaded here;
    /// a load failure makes the rule unusable and is reported with the
    /// country code attached.
    pub fn new(country: &str, adapter: &str, no_resolve: bool, source: GeoSource) -> Result<Self> {
        let backend = match source {
            GeoSource::Database(db) => Backend::Database(db),
            GeoSource::Compiled(loader) => {
                // the LAN sentinel never consults reference data
                if country.eq_ignore_ascii_case(LAN_SENTINEL) {
                    Backend::Compiled(CountryMatcher::empty(country))
                } else {
                    let matcher = CountryMatcher::compile(loader.as_ref(), country)?;
                    info!(
                        "initial GeoIP rule {} => {}, records: {}",
                        country,
                        adapter,
                        matcher.record_count()
                    );
                    Backend::Compiled(matcher)
                }
            }
        };
        Ok(Self {
            country: country.to_string(),
            adapter: adapter.to_string(),
            no_resolve,
            fake_broadcast: None,
            backend,
        })
    }

    /// Set the fake-broadcast address treated as LAN.
    pub fn with_fake_broadcast(mut self, ip: IpAddr) -> Self {
        self.fake_broadcast = Some(ip);
        self
    }

    pub fn country(&self) -> &str {
        &self.country
    }

    /// The compiled matcher, when built in compiled mode.
    pub fn matcher(&self) -> Option<&CountryMatcher> {
        match &self.backend {
            Backend::Compiled(matcher) => Some(matcher),
            Backend::Database(_) => None,
        }
    }

    fn is_lan(&self, ip: IpAddr) -> bool {
        is_private(ip)
            || ip.is_unspecified()
            || ip.is_loopback()
            || ip.is_multicast()
            || is_link_local_unicast(ip)
            || self.fake_broadcast == Some(ip)
    }
}

fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        // unique local fc00::/7
        IpAddr::V6(v6) => (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

fn is_link_local_unicast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        // fe80::/10
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

impl Rule for GeoIpRule {
    fn rule_type(&self) -> RuleType {
        RuleType::GeoIp
    }

    fn matches(&self, metadata: &Metadata) -> bool {
        let Some(ip) = metadata.dst_ip else {
            return false;
        };

        if self.country.eq_ignore_ascii_case(LAN_SENTINEL) {
            return self.is_lan(ip);
        }

        match &self.backend {
            Backend::Database(db) => db
                .country(ip)
                .is_some_and(|code| code.eq_ignore_ascii_case(&self.country)),
            Backend::Compiled(matcher) => matcher.match_ip(ip),
        }
    }

    fn adapter(&self) -> &str {
        &self.adapter
    }

    fn payload(&self) -> &str {
        &self.country
    }

    fn should_resolve_ip(&self) -> bool {
        !self.no_resolve
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use ipnet::IpNet;

    struct FakeDb;

    impl CountryLookup for FakeDb {
        fn country(&self, ip: IpAddr) -> Option<String> {
            match ip.to_string().as_str() {
                "1.0.16.1" => Some("jp".to_string()),
                "8.8.8.8" => Some("US".to_string()),
                _ => None,
            }
        }
    }

    struct JpLoader;

    impl GeoDataLoader for JpLoader {
        fn load(&self, country: &str) -> Result<Vec<IpNet>> {
            if country.eq_ignore_ascii_case("JP") {
                Ok(vec!["1.0.16.0/20".parse().unwrap()])
            } else {
                Err(Error::Config(format!("no data for {}", country)))
            }
        }
    }

    fn meta(ip: &str) -> Metadata {
        Metadata {
            dst_ip: Some(ip.parse().unwrap()),
            dst_port: 443,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_destination_ip_never_matches() {
        let rule =
            GeoIpRule::new("JP", "proxy", false, GeoSource::Database(Arc::new(FakeDb))).unwrap();
        assert!(!rule.matches(&Metadata::default()));
    }

    #[test]
    fn test_lan_sentinel() {
        let rule = GeoIpRule::new("LAN", "DIRECT", true, GeoSource::Database(Arc::new(FakeDb)))
            .unwrap()
            .with_fake_broadcast("198.18.255.255".parse().unwrap());

        assert!(rule.matches(&meta("192.168.1.1")));
        assert!(rule.matches(&meta("127.0.0.1")));
        assert!(rule.matches(&meta("224.0.0.1")));
        assert!(rule.matches(&meta("0.0.0.0")));
        assert!(rule.matches(&meta("169.254.1.1")));
        assert!(rule.matches(&meta("198.18.255.255")));
        assert!(rule.matches(&meta("fe80::1")));
        assert!(rule.matches(&meta("fd00::1")));

        assert!(!rule.matches(&meta("8.8.8.8")));
        assert!(!rule.should_resolve_ip());
    }

    #[test]
    fn test_lan_sentinel_compiled_mode_skips_load() {
        // lowercase sentinel, compiled mode: no geodata consulted
        let rule =
            GeoIpRule::new("lan", "DIRECT", false, GeoSource::Compiled(Arc::new(JpLoader)))
                .unwrap();
        assert!(rule.matches(&meta("10.0.0.1")));
        assert!(!rule.matches(&meta("8.8.8.8")));
    }

    #[test]
    fn test_database_mode_case_insensitive() {
        let rule =
            GeoIpRule::new("JP", "proxy", false, GeoSource::Database(Arc::new(FakeDb))).unwrap();
        assert!(rule.matches(&meta("1.0.16.1"))); // db says "jp"
        assert!(!rule.matches(&meta("8.8.8.8"))); // db says "US"
        assert!(!rule.matches(&meta("100.100.100.100"))); // unknown
        assert!(rule.matcher().is_none());

        let us = GeoIpRule::new("us", "proxy", false, GeoSource::Database(Arc::new(FakeDb)))
            .unwrap();
        assert!(us.matches(&meta("8.8.8.8")));
    }

    #[test]
    fn test_compiled_mode() {
        let rule =
            GeoIpRule::new("JP", "proxy", false, GeoSource::Compiled(Arc::new(JpLoader))).unwrap();
        assert_eq!(rule.rule_type(), RuleType::GeoIp);
        assert_eq!(rule.adapter(), "proxy");
        assert_eq!(rule.payload(), "JP");
        assert_eq!(rule.matcher().unwrap().record_count(), 1);

        assert!(rule.matches(&meta("1.0.16.1")));
        assert!(!rule.matches(&meta("8.8.8.8")));
    }

    #[test]
    fn test_compiled_mode_load_failure() {
        match GeoIpRule::new("XX", "proxy", false, GeoSource::Compiled(Arc::new(JpLoader))) {
            Err(Error::GeoDataLoad { country, .. }) => assert_eq!(country, "XX"),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("rule construction should fail for XX"),
        }
    }
}
