//! Metadata - the unified per-flow context for routing decisions
//!
//! Built once at ingress, immutable afterwards. Rules and the dispatcher
//! ONLY depend on Metadata, never on the flow handle itself.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Serialize, Serializer};

/// Network type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Udp => write!(f, "udp"),
        }
    }
}

impl Serialize for Network {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How the flow entered the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressType {
    Http,
    HttpConnect,
    Socks4,
    Socks5,
    Redir,
    Tproxy,
    Tun,
    Inner,
}

impl fmt::Display for IngressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IngressType::Http => "HTTP",
            IngressType::HttpConnect => "HTTP Connect",
            IngressType::Socks4 => "Socks4",
            IngressType::Socks5 => "Socks5",
            IngressType::Redir => "Redir",
            IngressType::Tproxy => "TProxy",
            IngressType::Tun => "Tun",
            IngressType::Inner => "Inner",
        };
        write!(f, "{}", s)
    }
}

impl Serialize for IngressType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// How the destination hostname was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DnsMode {
    #[default]
    Normal,
    FakeIp,
    /// Hostname was mapped back from a previously answered query
    Mapping,
}

impl fmt::Display for DnsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsMode::Normal => write!(f, "normal"),
            DnsMode::FakeIp => write!(f, "fake-ip"),
            DnsMode::Mapping => write!(f, "redir-host"),
        }
    }
}

impl Serialize for DnsMode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Address-family tag for the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddrFamily {
    Ipv4,
    Ipv6,
    #[default]
    Domain,
}

/// Metadata extracted at flow ingress.
///
/// Serializes with the wire field names used by status APIs.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub network: Network,
    #[serde(rename = "type")]
    pub ingress: IngressType,
    #[serde(rename = "sourceIP")]
    pub src_ip: IpAddr,
    #[serde(rename = "destinationIP")]
    pub dst_ip: Option<IpAddr>,
    #[serde(rename = "sourcePort", serialize_with = "port_as_string")]
    pub src_port: u16,
    #[serde(rename = "destinationPort", serialize_with = "port_as_string")]
    pub dst_port: u16,
    pub host: String,
    #[serde(rename = "dnsMode")]
    pub dns_mode: DnsMode,
    #[serde(skip)]
    pub addr_family: AddrFamily,
    pub process: Option<String>,
    #[serde(rename = "processPath")]
    pub process_path: Option<String>,
}

fn port_as_string<S: Serializer>(port: &u16, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(port)
}

impl Metadata {
    /// Build metadata for a flow intercepted at the virtual interface.
    ///
    /// `local` is the address the client dialed (the flow target),
    /// `remote` is the client itself.
    pub fn tun(network: Network, local: SocketAddr, remote: SocketAddr) -> Self {
        let family = match local.ip() {
            IpAddr::V4(_) => AddrFamily::Ipv4,
            IpAddr::V6(_) => AddrFamily::Ipv6,
        };
        Self {
            network,
            ingress: IngressType::Tun,
            src_ip: remote.ip(),
            src_port: remote.port(),
            dst_ip: Some(local.ip()),
            dst_port: local.port(),
            host: String::new(),
            dns_mode: DnsMode::Normal,
            addr_family: family,
            process: None,
            process_path: None,
        }
    }

    /// A flow is addressable iff it carries a hostname or a destination IP.
    pub fn valid(&self) -> bool {
        !self.host.is_empty() || self.dst_ip.is_some()
    }

    /// Whether the destination IP is already known.
    pub fn resolved(&self) -> bool {
        self.dst_ip.is_some()
    }

    /// Copy with the mapped hostname cleared, so a stale DNS-mapping
    /// hostname is never redialed. No-op copy in every other case.
    pub fn pure(&self) -> Metadata {
        let mut copy = self.clone();
        if self.dns_mode == DnsMode::Mapping {
            if let Some(ip) = self.dst_ip {
                copy.host.clear();
                copy.addr_family = match ip {
                    IpAddr::V4(_) => AddrFamily::Ipv4,
                    IpAddr::V6(_) => AddrFamily::Ipv6,
                };
            }
        }
        copy
    }

    /// Remote address string, preferring `ip:port` over `host:port`.
    pub fn remote_address(&self) -> String {
        match self.dst_ip {
            Some(ip) => SocketAddr::new(ip, self.dst_port).to_string(),
            None => format!("{}:{}", self, self.dst_port),
        }
    }

    pub fn source_address(&self) -> String {
        SocketAddr::new(self.src_ip, self.src_port).to_string()
    }

    /// Source address with the originating process appended when known.
    pub fn source_detail(&self) -> String {
        if let Some(process) = &self.process {
            format!("{}({})", self.source_address(), process)
        } else if self.ingress == IngressType::Inner {
            "[flowgate]".to_string()
        } else {
            self.source_address()
        }
    }

    /// Destination as a UDP socket address, when applicable.
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        if self.network != Network::Udp {
            return None;
        }
        self.dst_ip.map(|ip| SocketAddr::new(ip, self.dst_port))
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.host.is_empty() {
            write!(f, "{}", self.host)
        } else if let Some(ip) = self.dst_ip {
            write!(f, "{}", ip)
        } else {
            write!(f, "<nil>")
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            ingress: IngressType::Tun,
            src_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_ip: None,
            dst_port: 0,
            host: String::new(),
            dns_mode: DnsMode::Normal,
            addr_family: AddrFamily::Domain,
            process: None,
            process_path: None,
        }
    }
}
