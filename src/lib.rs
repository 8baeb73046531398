//! flowgate - traffic-redirection core for a rule-based proxy client
//!
//! # Architecture
//!
//! ```text
//! Virtual interface (TUN)
//! → Flow Ingress (DNS hijack / Metadata reconstruction)
//! → bounded queues (blocking for streams, best-effort for datagrams)
//! → Dispatcher (external): Rule match → Outbound Group → dial
//! ```
//!
//! ## Core Principles
//!
//! - Metadata is built once at ingress and read everywhere downstream
//! - Rules are pure predicates over Metadata, no IO at match time
//! - Outbound groups resolve their active proxy through a coalesced,
//!   TTL-cached lookup; explicit selection is the only external mutation
//! - A flow is either hijacked or forwarded, never both
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── common/          # Core types: Metadata, Stream, queues, pools, single-flight
//! ├── ingress/         # TUN flow adapter + DNS hijack
//! ├── dns/             # Resolution-relay seam
//! ├── rule/            # Rule predicates (GeoIP)
//! ├── geodata/         # Country database / compiled matcher seams
//! └── outbound/        # ProxyAdapter capability trait + Selector group
//! ```

// Core types
pub mod common;
pub mod error;

// Pipeline layers
pub mod dns;
pub mod geodata;
pub mod ingress;
pub mod outbound;
pub mod rule;

// Supporting modules
pub mod config;

// Re-exports for convenience
pub use common::{DnsMode, IngressType, Metadata, Network, Stream};
pub use config::Config;
pub use error::{Error, Result};

// Architecture re-exports
pub use ingress::TunHandler;
pub use outbound::{Proxy, ProxyAdapter, Selector};
pub use rule::{GeoIpRule, Rule};
