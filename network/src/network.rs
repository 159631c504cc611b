//! Gossip primitives over the peer table.

use crate::channel::{Channel, DropPolicy};
use crate::peer_table::PeerTable;
use lattica_blocks::{Block, Vote};
use lattica_messages::{ConfirmAck, Keepalive, Message, Publish, KEEPALIVE_PEERS};
use lattica_protocol::serialize_message;
use lattica_types::{NetworkKind, PublicKey};
use std::sync::Arc;

/// Gossip façade: flood with square-root fanout, directed sends to
/// principal representatives.
pub struct Network {
    pub peers: Arc<PeerTable>,
    magic: [u8; 2],
}

impl Network {
    pub fn new(peers: Arc<PeerTable>, kind: NetworkKind) -> Self {
        Self {
            peers,
            magic: kind.magic(),
        }
    }

    /// sqrt(peer count) scaled by `scale`, minimum one when peers exist.
    fn fanout(&self, scale: f64) -> usize {
        let count = self.peers.len();
        if count == 0 {
            return 0;
        }
        (((count as f64).sqrt() * scale).ceil() as usize).max(1)
    }

    fn flood(&self, message: &Message, scale: f64, policy: DropPolicy) -> usize {
        let buffer = serialize_message(message, self.magic);
        let targets = self.peers.random_set(self.fanout(scale));
        let mut sent = 0;
        for channel in targets {
            if channel.send_buffer(buffer.clone(), policy) {
                self.peers.mark_sent(&channel.remote_endpoint());
                sent += 1;
            }
        }
        sent
    }

    pub fn flood_block(&self, block: Arc<Block>, scale: f64) -> usize {
        self.flood(
            &Message::Publish(Publish { block }),
            scale,
            DropPolicy::Limiter,
        )
    }

    pub fn flood_vote(&self, vote: Arc<Vote>, scale: f64) -> usize {
        self.flood(
            &Message::ConfirmAck(ConfirmAck { vote }),
            scale,
            DropPolicy::Limiter,
        )
    }

    pub fn flood_keepalive(&self) -> usize {
        let mut keepalive = Keepalive::default();
        for (slot, channel) in keepalive
            .peers
            .iter_mut()
            .zip(self.peers.random_set(KEEPALIVE_PEERS))
        {
            *slot = Some(channel.remote_endpoint());
        }
        self.flood(&Message::Keepalive(keepalive), 1.0, DropPolicy::Limiter)
    }

    /// Send a vote directly to every listed principal representative,
    /// bypassing fanout sampling.
    pub fn send_to_principals(&self, vote: Arc<Vote>, principals: &[PublicKey]) -> usize {
        let buffer = serialize_message(
            &Message::ConfirmAck(ConfirmAck { vote }),
            self.magic,
        );
        let mut sent = 0;
        for principal in principals {
            if let Some(channel) = self.peers.find_by_node_id(principal) {
                if channel.send_buffer(buffer.clone(), DropPolicy::NoSocketDrop) {
                    sent += 1;
                }
            }
        }
        sent
    }

    /// Send one serialized message to a specific channel.
    pub fn send(&self, channel: &dyn Channel, message: &Message, policy: DropPolicy) -> bool {
        let buffer = serialize_message(message, self.magic);
        let sent = channel.send_buffer(buffer, policy);
        if sent {
            self.peers.mark_sent(&channel.remote_endpoint());
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct CountingChannel {
        id: u64,
        remote: SocketAddr,
        node_id: Mutex<Option<PublicKey>>,
        sent: AtomicU64,
    }

    impl CountingChannel {
        fn new(remote: &str, node_id: Option<PublicKey>) -> Arc<Self> {
            static NEXT: AtomicU64 = AtomicU64::new(1);
            Arc::new(Self {
                id: NEXT.fetch_add(1, Ordering::Relaxed),
                remote: remote.parse().unwrap(),
                node_id: Mutex::new(node_id),
                sent: AtomicU64::new(0),
            })
        }
    }

    impl Channel for CountingChannel {
        fn id(&self) -> u64 {
            self.id
        }
        fn kind(&self) -> ChannelKind {
            ChannelKind::Tcp
        }
        fn remote_endpoint(&self) -> SocketAddr {
            self.remote
        }
        fn node_id(&self) -> Option<PublicKey> {
            *self.node_id.lock().unwrap()
        }
        fn set_node_id(&self, node_id: PublicKey) {
            *self.node_id.lock().unwrap() = Some(node_id);
        }
        fn network_version(&self) -> u8 {
            18
        }
        fn set_network_version(&self, _version: u8) {}
        fn send_buffer(&self, _buffer: Vec<u8>, _policy: DropPolicy) -> bool {
            self.sent.fetch_add(1, Ordering::Relaxed);
            true
        }
        fn dropped_count(&self) -> u64 {
            0
        }
    }

    fn network_with_peers(count: u16) -> (Network, Vec<Arc<CountingChannel>>) {
        let peers = Arc::new(PeerTable::new(64));
        let mut channels = Vec::new();
        for index in 0..count {
            let channel = CountingChannel::new(&format!("10.0.{}.{}:7175", index / 250, index % 250 + 1), None);
            assert!(peers.insert(channel.clone()));
            channels.push(channel);
        }
        (Network::new(peers, NetworkKind::Test), channels)
    }

    #[test]
    fn fanout_is_square_root() {
        let (network, _channels) = network_with_peers(16);
        assert_eq!(network.fanout(1.0), 4);
        assert_eq!(network.fanout(2.0), 8);
        let (empty, _) = network_with_peers(0);
        assert_eq!(empty.fanout(1.0), 0);
    }

    #[test]
    fn flood_keepalive_reaches_fanout_peers() {
        let (network, channels) = network_with_peers(9);
        let sent = network.flood_keepalive();
        assert_eq!(sent, 3);
        let total: u64 = channels.iter().map(|c| c.sent.load(Ordering::Relaxed)).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn principal_sends_are_directed() {
        let peers = Arc::new(PeerTable::new(64));
        let principal_id = PublicKey::new([1; 32]);
        let principal = CountingChannel::new("10.0.0.1:7175", Some(principal_id));
        let bystander = CountingChannel::new("10.0.0.2:7175", None);
        peers.insert(principal.clone());
        peers.insert(bystander.clone());
        let network = Network::new(peers, NetworkKind::Test);

        let key = lattica_crypto::KeyPair::from_seed([1; 32]);
        let vote = Arc::new(Vote::new(
            key.public,
            &key.private,
            1,
            vec![lattica_types::BlockHash::new([1; 32])],
        ));
        let sent = network.send_to_principals(vote, &[principal_id]);
        assert_eq!(sent, 1);
        assert_eq!(principal.sent.load(Ordering::Relaxed), 1);
        assert_eq!(bystander.sent.load(Ordering::Relaxed), 0);
    }
}
