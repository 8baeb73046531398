//! TUN flow handler
//!
//! One handler instance serves every flow the virtual interface produces.
//! Flows addressed to a configured DNS hijack address are answered inline
//! through the resolution relay; everything else is wrapped in Metadata and
//! handed to the dispatcher's queues. A flow is either hijacked or
//! forwarded, never both.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use crate::common::{BufferPool, FlowQueue, Metadata, Network, UDP_BUFFER_SIZE};
use crate::dns::DnsRelay;

use super::{PacketFlow, StreamFlow, TunStream, UdpFlow};

/// A hijacked stream is terminated after this long without progress.
pub const DNS_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// A TCP DNS message longer than this aborts the flow. Kept below the
/// 16-bit length-prefix maximum so the guard stays reachable.
const DNS_BUFFER_SIZE: usize = 16 * 1024;

pub struct TunHandler {
    dns_hijack: Vec<SocketAddr>,
    relay: Arc<dyn DnsRelay>,
    tcp_queue: FlowQueue<StreamFlow>,
    udp_queue: FlowQueue<PacketFlow>,
    pool: Arc<BufferPool>,
    dns_pool: Arc<BufferPool>,
}

impl TunHandler {
    pub fn new(
        dns_hijack: Vec<SocketAddr>,
        relay: Arc<dyn DnsRelay>,
        tcp_queue: FlowQueue<StreamFlow>,
        udp_queue: FlowQueue<PacketFlow>,
    ) -> Self {
        Self {
            dns_hijack,
            relay,
            tcp_queue,
            udp_queue,
            pool: BufferPool::new(UDP_BUFFER_SIZE),
            dns_pool: BufferPool::new(DNS_BUFFER_SIZE),
        }
    }

    /// A flow target matches a hijack address when the ports are equal and
    /// the hijack IP is either equal or unspecified (wildcard).
    fn should_hijack(&self, local: SocketAddr) -> bool {
        self.dns_hijack
            .iter()
            .any(|addr| addr.port() == local.port() && (addr.ip().is_unspecified() || addr.ip() == local.ip()))
    }

    /// Handle one TCP-like flow to completion.
    ///
    /// Hijack-matched flows are answered inline; others are handed to the
    /// TCP queue with a blocking send, so a saturated dispatcher
    /// backpressures new-flow acceptance.
    pub async fn handle_tcp(&self, stream: Box<dyn TunStream>) {
        let local = stream.local_addr();

        if self.should_hijack(local) {
            debug!("[TUN] hijack dns tcp: {}", local);
            self.hijack_stream(stream).await;
            return;
        }

        let metadata = Metadata::tun(Network::Tcp, local, stream.remote_addr());
        self.tcp_queue.push(StreamFlow { metadata, stream }).await;
    }

    /// Answer length-prefixed DNS queries on a hijacked stream until the
    /// client goes away. The deadline covers both the prefix and the
    /// payload read, so a client that stalls mid-message cannot pin the
    /// flow. Any read, parse, or relay error releases the flow; the client
    /// is expected to reconnect.
    async fn hijack_stream(&self, mut stream: Box<dyn TunStream>) {
        let mut buf = self.dns_pool.acquire();

        loop {
            let mut prefix = [0u8; 2];
            // deadline re-armed for every query
            match timeout(DNS_READ_TIMEOUT, stream.read_exact(&mut prefix)).await {
                Ok(Ok(_)) => {}
                _ => break,
            }

            let length = u16::from_be_bytes(prefix) as usize;
            if length > buf.len() {
                break;
            }
            match timeout(DNS_READ_TIMEOUT, stream.read_exact(&mut buf[..length])).await {
                Ok(Ok(_)) => {}
                _ => break,
            }

            let reply = match self.relay.relay(&buf[..length]).await {
                Ok(reply) => reply,
                Err(_) => break,
            };

            if stream.write_all(&reply).await.is_err() {
                break;
            }
        }
    }

    /// Run the read loop of one UDP-like flow.
    ///
    /// Each hijack-matched datagram spawns its own relay task, so replies
    /// may complete out of receipt order. Other datagrams are forwarded
    /// best-effort: when the UDP queue is full the datagram is dropped and
    /// the read loop keeps going.
    pub async fn handle_udp(&self, flow: Arc<dyn UdpFlow>) {
        let local = flow.local_addr();

        loop {
            let mut buf = self.pool.acquire();

            let (n, peer) = match flow.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(_) => break,
            };

            if self.should_hijack(local) {
                let relay = Arc::clone(&self.relay);
                let flow = Arc::clone(&flow);
                tokio::spawn(async move {
                    let buf = buf;
                    if let Ok(reply) = relay.relay(&buf[..n]).await {
                        let _ = flow.send_to(&reply, peer).await;
                        debug!("[TUN] hijack dns udp: {}", peer);
                    }
                });
                continue;
            }

            let metadata = Metadata::tun(Network::Udp, local, flow.remote_addr());
            let packet = PacketFlow::new(metadata, buf, n, peer, Arc::clone(&flow));
            if !self.udp_queue.push(packet).await {
                debug!("[TUN] udp queue full, dropped datagram from {}", peer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{bounded, IngressType, SendMode};
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

    const HIJACK: &str = "198.18.0.2:53";
    const TARGET: &str = "93.184.216.34:443";
    const CLIENT: &str = "172.19.0.1:50123";

    struct MockTunStream {
        inner: DuplexStream,
        local: SocketAddr,
        remote: SocketAddr,
    }

    impl MockTunStream {
        fn pair(local: &str) -> (Box<dyn TunStream>, DuplexStream) {
            let (near, far) = tokio::io::duplex(4096);
            let stream = Box::new(MockTunStream {
                inner: near,
                local: local.parse().unwrap(),
                remote: CLIENT.parse().unwrap(),
            });
            (stream, far)
        }
    }

    impl TunStream for MockTunStream {
        fn local_addr(&self) -> SocketAddr {
            self.local
        }

        fn remote_addr(&self) -> SocketAddr {
            self.remote
        }
    }

    impl AsyncRead for MockTunStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl AsyncWrite for MockTunStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    struct MockRelay {
        queries: Mutex<Vec<Vec<u8>>>,
        reply: Vec<u8>,
    }

    impl MockRelay {
        fn new(reply: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                queries: Mutex::new(Vec::new()),
                reply: reply.to_vec(),
            })
        }
    }

    #[async_trait]
    impl DnsRelay for MockRelay {
        async fn relay(&self, query: &[u8]) -> Result<Vec<u8>> {
            self.queries.lock().unwrap().push(query.to_vec());
            Ok(self.reply.clone())
        }
    }

    struct FailingRelay;

    #[async_trait]
    impl DnsRelay for FailingRelay {
        async fn relay(&self, _query: &[u8]) -> Result<Vec<u8>> {
            Err(Error::DnsRelay("upstream unreachable".to_string()))
        }
    }

    struct MockUdpFlow {
        local: SocketAddr,
        remote: SocketAddr,
        datagrams: Mutex<VecDeque<Vec<u8>>>,
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    impl MockUdpFlow {
        fn new(local: &str, datagrams: &[&[u8]]) -> Arc<Self> {
            Arc::new(Self {
                local: local.parse().unwrap(),
                remote: CLIENT.parse().unwrap(),
                datagrams: Mutex::new(datagrams.iter().map(|d| d.to_vec()).collect()),
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl UdpFlow for MockUdpFlow {
        fn local_addr(&self) -> SocketAddr {
            self.local
        }

        fn remote_addr(&self) -> SocketAddr {
            self.remote
        }

        async fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
            match self.datagrams.lock().unwrap().pop_front() {
                Some(datagram) => {
                    buf[..datagram.len()].copy_from_slice(&datagram);
                    Ok((datagram.len(), self.remote))
                }
                None => Err(std::io::ErrorKind::BrokenPipe.into()),
            }
        }

        async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> std::io::Result<usize> {
            self.sent.lock().unwrap().push((buf.to_vec(), addr));
            Ok(buf.len())
        }
    }

    fn handler(relay: Arc<dyn DnsRelay>) -> (TunHandler, HandlerQueues) {
        let (tcp_queue, tcp_rx) = bounded(4, SendMode::Blocking);
        let (udp_queue, udp_rx) = bounded(1, SendMode::BestEffort);
        let handler = TunHandler::new(
            vec![HIJACK.parse().unwrap()],
            relay,
            tcp_queue,
            udp_queue,
        );
        (handler, (tcp_rx, udp_rx))
    }

    type HandlerQueues = (
        tokio::sync::mpsc::Receiver<StreamFlow>,
        tokio::sync::mpsc::Receiver<PacketFlow>,
    );

    #[tokio::test]
    async fn test_hijacked_stream_answers_queries_in_order() {
        let relay = MockRelay::new(b"REPLY");
        let (handler, _queues) = handler(relay.clone());
        let (stream, mut client) = MockTunStream::pair(HIJACK);

        let task = tokio::spawn(async move { handler.handle_tcp(stream).await });

        // first length-prefixed query
        client.write_all(&[0x00, 0x05]).await.unwrap();
        client.write_all(b"hello").await.unwrap();
        let mut reply = [0u8; 5];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"REPLY");

        // the loop keeps reading: a second query on the same stream
        client.write_all(&[0x00, 0x03]).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"REPLY");

        drop(client);
        task.await.unwrap();

        let queries = relay.queries.lock().unwrap();
        assert_eq!(queries.as_slice(), [b"hello".to_vec(), b"abc".to_vec()]);
    }

    #[tokio::test]
    async fn test_hijacked_stream_aborts_on_oversize_length() {
        let relay = MockRelay::new(b"REPLY");
        let (handler, _queues) = handler(relay.clone());
        let (stream, mut client) = MockTunStream::pair(HIJACK);

        let task = tokio::spawn(async move { handler.handle_tcp(stream).await });

        // declared length exceeds the DNS buffer: flow aborted
        client.write_all(&[0xff, 0xff]).await.unwrap();
        task.await.unwrap();
        assert!(relay.queries.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_payload_read_released_by_deadline() {
        let relay = MockRelay::new(b"REPLY");
        let (handler, _queues) = handler(relay.clone());
        let (stream, mut client) = MockTunStream::pair(HIJACK);

        let task = tokio::spawn(async move { handler.handle_tcp(stream).await });

        // prefix announces a payload that never arrives
        client.write_all(&[0x00, 0x64]).await.unwrap();
        task.await.unwrap();
        assert!(relay.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hijacked_stream_relay_error_terminates_flow() {
        let (handler, _queues) = handler(Arc::new(FailingRelay));
        let (stream, mut client) = MockTunStream::pair(HIJACK);

        let task = tokio::spawn(async move { handler.handle_tcp(stream).await });

        client.write_all(&[0x00, 0x02]).await.unwrap();
        client.write_all(b"hi").await.unwrap();
        // no retry: the handler releases the flow
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_non_hijacked_stream_forwarded_with_metadata() {
        let relay = MockRelay::new(b"REPLY");
        let (handler, (mut tcp_rx, _udp_rx)) = handler(relay.clone());
        let (stream, _client) = MockTunStream::pair(TARGET);

        handler.handle_tcp(stream).await;

        let flow = tcp_rx.recv().await.unwrap();
        assert_eq!(flow.metadata.ingress, IngressType::Tun);
        assert_eq!(flow.metadata.network, Network::Tcp);
        assert_eq!(flow.metadata.dst_ip, Some("93.184.216.34".parse().unwrap()));
        assert_eq!(flow.metadata.dst_port, 443);
        assert_eq!(flow.metadata.src_ip, "172.19.0.1".parse::<std::net::IpAddr>().unwrap());
        assert!(relay.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hijacked_udp_datagrams_relayed_back() {
        let relay = MockRelay::new(b"ANSWER");
        let (handler, _queues) = handler(relay.clone());
        let flow = MockUdpFlow::new(HIJACK, &[b"query1", b"query2"]);

        handler.handle_udp(Arc::clone(&flow) as Arc<dyn UdpFlow>).await;

        // relay tasks are scheduled independently of the read loop
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent = flow.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        for (payload, addr) in sent.iter() {
            assert_eq!(payload, b"ANSWER");
            assert_eq!(*addr, CLIENT.parse().unwrap());
        }
        assert_eq!(relay.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_udp_queue_full_drops_without_blocking() {
        let relay = MockRelay::new(b"ANSWER");
        // udp queue capacity is 1 and nothing drains it
        let (handler, (_tcp_rx, mut udp_rx)) = handler(relay);
        let flow = MockUdpFlow::new(TARGET, &[b"one", b"two", b"three"]);

        // completes despite the full queue: datagrams are dropped, not queued
        handler.handle_udp(Arc::clone(&flow) as Arc<dyn UdpFlow>).await;

        let packet = udp_rx.recv().await.unwrap();
        assert_eq!(packet.payload(), b"one");
        assert_eq!(packet.metadata.network, Network::Udp);
        assert!(udp_rx.try_recv().is_err());
        assert!(flow.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wildcard_hijack_address() {
        let relay = MockRelay::new(b"REPLY");
        let (tcp_queue, _tcp_rx) = bounded(4, SendMode::Blocking);
        let (udp_queue, _udp_rx) = bounded(4, SendMode::BestEffort);
        let handler = TunHandler::new(
            vec!["0.0.0.0:53".parse().unwrap()],
            relay.clone(),
            tcp_queue,
            udp_queue,
        );

        assert!(handler.should_hijack("10.0.0.1:53".parse().unwrap()));
        assert!(!handler.should_hijack("10.0.0.1:443".parse().unwrap()));
    }
}
