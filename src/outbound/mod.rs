//! Outbound layer
//!
//! [`ProxyAdapter`] is the capability interface the dispatcher dials
//! through: concrete proxies and groups are interchangeable behind it.
//! Connections carry a traversal chain so introspection can show which
//! groups a flow passed through.

pub mod provider;
pub mod selector;

pub use provider::{collect_proxies, ProxyProvider};
pub use selector::{Selector, SelectorOptions, DEFAULT_SELECTED};

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::common::{Metadata, Result, Stream};

/// Shared handle to any outbound adapter.
pub type Proxy = Arc<dyn ProxyAdapter>;

/// Adapter kind tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterType {
    Direct,
    Selector,
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterType::Direct => write!(f, "Direct"),
            AdapterType::Selector => write!(f, "Selector"),
        }
    }
}

/// Capability interface over concrete proxies and groups.
#[async_trait]
pub trait ProxyAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn adapter_type(&self) -> AdapterType;

    fn support_udp(&self) -> bool;

    /// Open a stream connection toward the flow's destination.
    async fn dial(&self, metadata: &Metadata) -> Result<Connection>;

    /// Open a packet connection for a UDP flow.
    async fn listen_packet(&self, metadata: &Metadata) -> Result<PacketConnection>;

    /// Resolve to the concrete proxy behind a group, if this adapter is one.
    fn unwrap(&self, metadata: &Metadata) -> Option<Proxy> {
        let _ = metadata;
        None
    }

    /// Serialization view for status APIs.
    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "type": self.adapter_type().to_string() })
    }
}

/// Stream connection with the chain of adapters it traversed.
pub struct Connection {
    stream: Stream,
    chains: Vec<String>,
}

impl Connection {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            chains: Vec::new(),
        }
    }

    pub fn append_chain(&mut self, name: &str) {
        self.chains.push(name.to_string());
    }

    pub fn chains(&self) -> &[String] {
        &self.chains
    }

    pub fn into_stream(self) -> Stream {
        self.stream
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Datagram half opened by an outbound adapter.
#[async_trait]
pub trait OutboundDatagram: Send + Sync {
    async fn send_to(&self, buf: &[u8], dst: SocketAddr) -> std::io::Result<usize>;
    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)>;
}

/// Packet connection with the chain of adapters it traversed.
pub struct PacketConnection {
    socket: Box<dyn OutboundDatagram>,
    chains: Vec<String>,
}

impl PacketConnection {
    pub fn new(socket: Box<dyn OutboundDatagram>) -> Self {
        Self {
            socket,
            chains: Vec::new(),
        }
    }

    pub fn append_chain(&mut self, name: &str) {
        self.chains.push(name.to_string());
    }

    pub fn chains(&self) -> &[String] {
        &self.chains
    }

    pub async fn send_to(&self, buf: &[u8], dst: SocketAddr) -> std::io::Result<usize> {
        self.socket.send_to(buf, dst).await
    }

    pub async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf).await
    }
}
