//! Flow ingress layer
//!
//! Bridges the virtual network interface's flow abstraction to the rest of
//! the pipeline. The interface layer hands us completed flows (a TCP-like
//! stream or a UDP-like datagram exchange); this layer reconstructs the
//! per-flow Metadata, hijacks resolver traffic inline, and forwards
//! everything else to the dispatcher's queues.

mod tun;

pub use tun::{TunHandler, DNS_READ_TIMEOUT};

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::common::{Metadata, PooledBuf};

/// A TCP-like flow intercepted at the virtual interface.
///
/// `local_addr` is the address the client dialed (the flow target);
/// `remote_addr` is the client itself.
pub trait TunStream: AsyncRead + AsyncWrite + Send + Unpin {
    fn local_addr(&self) -> SocketAddr;
    fn remote_addr(&self) -> SocketAddr;
}

/// A UDP-like flow intercepted at the virtual interface.
#[async_trait]
pub trait UdpFlow: Send + Sync {
    fn local_addr(&self) -> SocketAddr;
    fn remote_addr(&self) -> SocketAddr;

    async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)>;
    async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> std::io::Result<usize>;
}

/// A stream flow handed downstream: Metadata plus the stream handle,
/// transferred exactly once.
pub struct StreamFlow {
    pub metadata: Metadata,
    pub stream: Box<dyn TunStream>,
}

/// A datagram handed downstream, carrying its pooled payload and the flow
/// handle needed to write replies back.
pub struct PacketFlow {
    pub metadata: Metadata,
    payload: PooledBuf,
    len: usize,
    pub peer: SocketAddr,
    pub flow: Arc<dyn UdpFlow>,
}

impl PacketFlow {
    pub fn new(
        metadata: Metadata,
        payload: PooledBuf,
        len: usize,
        peer: SocketAddr,
        flow: Arc<dyn UdpFlow>,
    ) -> Self {
        Self {
            metadata,
            payload,
            len,
            peer,
            flow,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}
