//! Rule layer
//!
//! Rules are pure predicates over Metadata: no IO at match time, no async.
//! The dispatcher walks its rule list and routes the flow to the adapter
//! named by the first rule that matches.

pub mod geoip;

pub use geoip::{GeoIpRule, GeoSource};

use std::fmt;

use crate::common::Metadata;

/// Rule kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleType {
    GeoIp,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::GeoIp => write!(f, "GeoIP"),
        }
    }
}

/// A routing rule: classifies a flow and names the adapter to route to.
pub trait Rule: Send + Sync {
    fn rule_type(&self) -> RuleType;

    /// Pure predicate over flow metadata.
    fn matches(&self, metadata: &Metadata) -> bool;

    /// Adapter or group name this rule routes matched flows to.
    fn adapter(&self) -> &str;

    /// The rule's configured payload (country code for geo rules).
    fn payload(&self) -> &str;

    /// Whether the dispatcher must resolve the destination IP before
    /// asking this rule to match.
    fn should_resolve_ip(&self) -> bool {
        true
    }
}
