//! Peer table: known endpoints persisted across restarts.

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// 18-byte key: 16-byte address (IPv4 mapped into IPv6) ‖ port big-endian.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EndpointKey {
    pub address: [u8; 16],
    pub port: u16,
}

impl EndpointKey {
    pub const SIZE: usize = 18;

    pub fn new(address: [u8; 16], port: u16) -> Self {
        Self { address, port }
    }

    pub fn to_bytes(&self) -> [u8; 18] {
        let mut out = [0u8; 18];
        out[..16].copy_from_slice(&self.address);
        out[16..].copy_from_slice(&self.port.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            address: bytes[..16].try_into().unwrap(),
            port: u16::from_be_bytes(bytes[16..].try_into().unwrap()),
        })
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        let v6 = Ipv6Addr::from(self.address);
        match v6.to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), self.port),
            None => SocketAddr::new(IpAddr::V6(v6), self.port),
        }
    }
}

impl From<SocketAddr> for EndpointKey {
    fn from(addr: SocketAddr) -> Self {
        let v6 = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self::new(v6.octets(), addr.port())
    }
}

pub trait PeerStore: Send + Sync {
    fn put(&self, txn: &mut dyn WriteTransaction, key: &EndpointKey) -> Result<(), StoreError>;

    fn del(&self, txn: &mut dyn WriteTransaction, key: &EndpointKey) -> Result<(), StoreError>;

    fn exists(&self, txn: &dyn Transaction, key: &EndpointKey) -> bool;

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&EndpointKey) -> bool);

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError>;
}
