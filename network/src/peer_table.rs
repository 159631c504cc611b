//! Known peers, indexed every way the node needs them.

use crate::channel::Channel;
use lattica_types::PublicKey;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub struct PeerEntry {
    pub channel: Arc<dyn Channel>,
    pub last_packet_sent: Instant,
    pub last_bootstrap_attempt: Option<Instant>,
}

struct Inner {
    by_endpoint: HashMap<SocketAddr, PeerEntry>,
    by_node_id: HashMap<PublicKey, SocketAddr>,
}

/// The live peer set. One entry per endpoint; node-id and IP lookups are
/// maintained alongside.
pub struct PeerTable {
    inner: Mutex<Inner>,
    max_peers_per_ip: usize,
}

impl PeerTable {
    pub fn new(max_peers_per_ip: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_endpoint: HashMap::new(),
                by_node_id: HashMap::new(),
            }),
            max_peers_per_ip,
        }
    }

    /// Register a channel. Rejects duplicate node ids and over-quota IPs.
    pub fn insert(&self, channel: Arc<dyn Channel>) -> bool {
        let endpoint = channel.remote_endpoint();
        let mut inner = self.inner.lock().unwrap();
        if inner.by_endpoint.contains_key(&endpoint) {
            return false;
        }
        let same_ip = inner
            .by_endpoint
            .keys()
            .filter(|existing| existing.ip() == endpoint.ip())
            .count();
        if same_ip >= self.max_peers_per_ip {
            return false;
        }
        if let Some(node_id) = channel.node_id() {
            if inner.by_node_id.contains_key(&node_id) {
                // A second connection claiming the same identity.
                return false;
            }
            inner.by_node_id.insert(node_id, endpoint);
        }
        inner.by_endpoint.insert(
            endpoint,
            PeerEntry {
                channel,
                last_packet_sent: Instant::now(),
                last_bootstrap_attempt: None,
            },
        );
        true
    }

    pub fn erase(&self, endpoint: &SocketAddr) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.by_endpoint.remove(endpoint) {
            if let Some(node_id) = entry.channel.node_id() {
                inner.by_node_id.remove(&node_id);
            }
        }
    }

    pub fn find(&self, endpoint: &SocketAddr) -> Option<Arc<dyn Channel>> {
        self.inner
            .lock()
            .unwrap()
            .by_endpoint
            .get(endpoint)
            .map(|entry| Arc::clone(&entry.channel))
    }

    pub fn find_by_node_id(&self, node_id: &PublicKey) -> Option<Arc<dyn Channel>> {
        let inner = self.inner.lock().unwrap();
        let endpoint = inner.by_node_id.get(node_id)?;
        inner
            .by_endpoint
            .get(endpoint)
            .map(|entry| Arc::clone(&entry.channel))
    }

    pub fn mark_sent(&self, endpoint: &SocketAddr) {
        if let Some(entry) = self.inner.lock().unwrap().by_endpoint.get_mut(endpoint) {
            entry.last_packet_sent = Instant::now();
        }
    }

    pub fn mark_bootstrap_attempt(&self, endpoint: &SocketAddr) {
        if let Some(entry) = self.inner.lock().unwrap().by_endpoint.get_mut(endpoint) {
            entry.last_bootstrap_attempt = Some(Instant::now());
        }
    }

    /// A uniformly random subset of `count` channels.
    pub fn random_set(&self, count: usize) -> Vec<Arc<dyn Channel>> {
        let inner = self.inner.lock().unwrap();
        let mut all: Vec<Arc<dyn Channel>> = inner
            .by_endpoint
            .values()
            .map(|entry| Arc::clone(&entry.channel))
            .collect();
        drop(inner);
        let mut rng = rand::thread_rng();
        all.shuffle(&mut rng);
        all.truncate(count);
        all
    }

    pub fn all(&self) -> Vec<Arc<dyn Channel>> {
        self.inner
            .lock()
            .unwrap()
            .by_endpoint
            .values()
            .map(|entry| Arc::clone(&entry.channel))
            .collect()
    }

    /// The peer least recently tried for bootstrap, for attempt rotation.
    pub fn bootstrap_candidate(&self) -> Option<Arc<dyn Channel>> {
        let inner = self.inner.lock().unwrap();
        inner
            .by_endpoint
            .values()
            .min_by_key(|entry| entry.last_bootstrap_attempt)
            .map(|entry| Arc::clone(&entry.channel))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All endpoints for persistence into the peer table on shutdown.
    pub fn endpoints(&self) -> Vec<SocketAddr> {
        self.inner
            .lock()
            .unwrap()
            .by_endpoint
            .keys()
            .copied()
            .collect()
    }

    pub fn ip_count(&self, ip: &IpAddr) -> usize {
        self.inner
            .lock()
            .unwrap()
            .by_endpoint
            .keys()
            .filter(|endpoint| endpoint.ip() == *ip)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKind;
    use crate::DropPolicy;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeChannel {
        id: u64,
        remote: SocketAddr,
        node_id: Mutex<Option<PublicKey>>,
        sent: AtomicU64,
    }

    impl FakeChannel {
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

    impl Channel for FakeChannel {
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

    #[test]
    fn insert_and_lookup() {
        let table = PeerTable::new(4);
        let node_id = PublicKey::new([1; 32]);
        let channel = FakeChannel::new("10.0.0.1:7175", Some(node_id));
        assert!(table.insert(channel.clone()));
        assert_eq!(table.len(), 1);
        assert!(table.find(&channel.remote_endpoint()).is_some());
        assert!(table.find_by_node_id(&node_id).is_some());
    }

    #[test]
    fn duplicate_endpoint_and_node_id_rejected() {
        let table = PeerTable::new(4);
        let node_id = PublicKey::new([1; 32]);
        assert!(table.insert(FakeChannel::new("10.0.0.1:7175", Some(node_id))));
        assert!(!table.insert(FakeChannel::new("10.0.0.1:7175", None)));
        assert!(!table.insert(FakeChannel::new("10.0.0.2:7175", Some(node_id))));
    }

    #[test]
    fn per_ip_quota() {
        let table = PeerTable::new(2);
        assert!(table.insert(FakeChannel::new("10.0.0.1:1", None)));
        assert!(table.insert(FakeChannel::new("10.0.0.1:2", None)));
        assert!(!table.insert(FakeChannel::new("10.0.0.1:3", None)));
        assert_eq!(table.ip_count(&"10.0.0.1".parse().unwrap()), 2);
    }

    #[test]
    fn random_set_bounds() {
        let table = PeerTable::new(16);
        for port in 1..=9u16 {
            table.insert(FakeChannel::new(&format!("10.0.0.{port}:7175"), None));
        }
        assert_eq!(table.random_set(3).len(), 3);
        assert_eq!(table.random_set(100).len(), 9);
    }

    #[test]
    fn erase_cleans_node_index() {
        let table = PeerTable::new(4);
        let node_id = PublicKey::new([1; 32]);
        let channel = FakeChannel::new("10.0.0.1:7175", Some(node_id));
        table.insert(channel.clone());
        table.erase(&channel.remote_endpoint());
        assert!(table.find_by_node_id(&node_id).is_none());
        assert!(table.is_empty());
    }
}
