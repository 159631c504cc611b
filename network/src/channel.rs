//! Send channels over UDP and TCP.
//!
//! A channel is the one-way send surface toward a peer. TCP channels own a
//! bounded write queue drained by a writer task; UDP channels send
//! datagrams directly. Everything above this layer deals in serialized
//! message buffers.

use crate::bandwidth_limiter::BandwidthLimiter;
use lattica_types::PublicKey;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Outstanding buffers a TCP channel will queue before applying its drop
/// policy.
const WRITE_QUEUE_SIZE: usize = 128;

/// What to do when a send would exceed the queue or bandwidth budget.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DropPolicy {
    /// Consult the bandwidth limiter and drop when out of budget.
    Limiter,
    /// Bypass the limiter and tolerate a deeper queue; used for traffic
    /// that must not silently vanish (handshakes, bootstrap).
    NoSocketDrop,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChannelKind {
    Udp,
    Tcp,
}

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

fn next_channel_id() -> u64 {
    NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed)
}

/// The abstract send endpoint.
pub trait Channel: Send + Sync {
    fn id(&self) -> u64;
    fn kind(&self) -> ChannelKind;
    fn remote_endpoint(&self) -> SocketAddr;
    fn node_id(&self) -> Option<PublicKey>;
    fn set_node_id(&self, node_id: PublicKey);
    fn network_version(&self) -> u8;
    fn set_network_version(&self, version: u8);

    /// Queue `buffer` for sending. Returns false if dropped.
    fn send_buffer(&self, buffer: Vec<u8>, policy: DropPolicy) -> bool;

    /// Buffers dropped so far on this channel.
    fn dropped_count(&self) -> u64;
}

struct ChannelMeta {
    id: u64,
    remote: SocketAddr,
    node_id: std::sync::Mutex<Option<PublicKey>>,
    network_version: AtomicU8,
    dropped: AtomicU64,
}

impl ChannelMeta {
    fn new(remote: SocketAddr) -> Self {
        Self {
            id: next_channel_id(),
            remote,
            node_id: std::sync::Mutex::new(None),
            network_version: AtomicU8::new(0),
            dropped: AtomicU64::new(0),
        }
    }
}

/// Datagram channel: one per remote endpoint, all sharing the node socket.
///
/// Construction captures the current tokio runtime so sends may be issued
/// from any thread, not just runtime workers.
pub struct UdpChannel {
    meta: ChannelMeta,
    socket: Arc<UdpSocket>,
    limiter: Arc<BandwidthLimiter>,
    runtime: tokio::runtime::Handle,
}

impl UdpChannel {
    pub fn new(socket: Arc<UdpSocket>, remote: SocketAddr, limiter: Arc<BandwidthLimiter>) -> Self {
        Self {
            meta: ChannelMeta::new(remote),
            socket,
            limiter,
            runtime: tokio::runtime::Handle::current(),
        }
    }
}

impl Channel for UdpChannel {
    fn id(&self) -> u64 {
        self.meta.id
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Udp
    }

    fn remote_endpoint(&self) -> SocketAddr {
        self.meta.remote
    }

    fn node_id(&self) -> Option<PublicKey> {
        *self.meta.node_id.lock().unwrap()
    }

    fn set_node_id(&self, node_id: PublicKey) {
        *self.meta.node_id.lock().unwrap() = Some(node_id);
    }

    fn network_version(&self) -> u8 {
        self.meta.network_version.load(Ordering::Relaxed)
    }

    fn set_network_version(&self, version: u8) {
        self.meta.network_version.store(version, Ordering::Relaxed);
    }

    fn send_buffer(&self, buffer: Vec<u8>, policy: DropPolicy) -> bool {
        if policy == DropPolicy::Limiter && !self.limiter.should_pass(buffer.len()) {
            self.meta.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let socket = Arc::clone(&self.socket);
        let remote = self.meta.remote;
        self.runtime.spawn(async move {
            if let Err(error) = socket.send_to(&buffer, remote).await {
                tracing::trace!(%remote, %error, "udp send failed");
            }
        });
        true
    }

    fn dropped_count(&self) -> u64 {
        self.meta.dropped.load(Ordering::Relaxed)
    }
}

/// Stream channel: owns the socket's write half through a writer task.
pub struct TcpChannel {
    meta: ChannelMeta,
    queue: mpsc::Sender<Vec<u8>>,
    limiter: Arc<BandwidthLimiter>,
    runtime: tokio::runtime::Handle,
}

impl TcpChannel {
    /// Wrap the write half of an established stream. The reader half stays
    /// with the caller's receive loop.
    pub fn new(
        mut writer: OwnedWriteHalf,
        remote: SocketAddr,
        limiter: Arc<BandwidthLimiter>,
    ) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_SIZE);
        tokio::spawn(async move {
            while let Some(buffer) = rx.recv().await {
                if let Err(error) = writer.write_all(&buffer).await {
                    tracing::debug!(%remote, %error, "tcp write failed, closing channel");
                    break;
                }
            }
        });
        Arc::new(Self {
            meta: ChannelMeta::new(remote),
            queue: tx,
            limiter,
            runtime: tokio::runtime::Handle::current(),
        })
    }
}

impl Channel for TcpChannel {
    fn id(&self) -> u64 {
        self.meta.id
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Tcp
    }

    fn remote_endpoint(&self) -> SocketAddr {
        self.meta.remote
    }

    fn node_id(&self) -> Option<PublicKey> {
        *self.meta.node_id.lock().unwrap()
    }

    fn set_node_id(&self, node_id: PublicKey) {
        *self.meta.node_id.lock().unwrap() = Some(node_id);
    }

    fn network_version(&self) -> u8 {
        self.meta.network_version.load(Ordering::Relaxed)
    }

    fn set_network_version(&self, version: u8) {
        self.meta.network_version.store(version, Ordering::Relaxed);
    }

    fn send_buffer(&self, buffer: Vec<u8>, policy: DropPolicy) -> bool {
        if policy == DropPolicy::Limiter && !self.limiter.should_pass(buffer.len()) {
            self.meta.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        match policy {
            DropPolicy::Limiter => match self.queue.try_send(buffer) {
                Ok(()) => true,
                Err(_) => {
                    self.meta.dropped.fetch_add(1, Ordering::Relaxed);
                    false
                }
            },
            DropPolicy::NoSocketDrop => {
                // Tolerate a deeper queue: hand the buffer to a task that
                // waits for capacity instead of dropping.
                let queue = self.queue.clone();
                self.runtime.spawn(async move {
                    let _ = queue.send(buffer).await;
                });
                true
            }
        }
    }

    fn dropped_count(&self) -> u64 {
        self.meta.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn tcp_channel_delivers_buffers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let (_read, write) = client.into_split();
        let limiter = Arc::new(BandwidthLimiter::new(0, 0));
        let channel = TcpChannel::new(write, addr, limiter);

        assert!(channel.send_buffer(vec![1, 2, 3], DropPolicy::Limiter));
        let mut received = [0u8; 3];
        server.read_exact(&mut received).await.unwrap();
        assert_eq!(received, [1, 2, 3]);
        assert_eq!(channel.dropped_count(), 0);
    }

    #[tokio::test]
    async fn limiter_drops_and_counts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (_server, _) = listener.accept().await.unwrap();

        let (_read, write) = client.into_split();
        // One-byte budget: the second send must drop.
        let limiter = Arc::new(BandwidthLimiter::new(1, 1));
        let channel = TcpChannel::new(write, addr, limiter);

        assert!(channel.send_buffer(vec![0], DropPolicy::Limiter));
        assert!(!channel.send_buffer(vec![0; 64], DropPolicy::Limiter));
        assert_eq!(channel.dropped_count(), 1);
        // NoSocketDrop bypasses the limiter.
        assert!(channel.send_buffer(vec![0; 64], DropPolicy::NoSocketDrop));
    }

    #[tokio::test]
    async fn udp_channel_sends_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote = receiver.local_addr().unwrap();
        let sender = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let limiter = Arc::new(BandwidthLimiter::new(0, 0));
        let channel = UdpChannel::new(sender, remote, limiter);

        assert!(channel.send_buffer(vec![7, 8], DropPolicy::Limiter));
        let mut buf = [0u8; 16];
        let (len, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], &[7, 8]);
    }

    #[tokio::test]
    async fn channel_metadata() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote = receiver.local_addr().unwrap();
        let sender = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let limiter = Arc::new(BandwidthLimiter::new(0, 0));
        let channel = UdpChannel::new(sender, remote, limiter);

        assert_eq!(channel.kind(), ChannelKind::Udp);
        assert!(channel.node_id().is_none());
        channel.set_node_id(PublicKey::new([1; 32]));
        assert!(channel.node_id().is_some());
        channel.set_network_version(18);
        assert_eq!(channel.network_version(), 18);
    }
}
