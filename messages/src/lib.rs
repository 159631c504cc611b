//! Network message model.
//!
//! These are the in-memory shapes; the byte-level codec lives in
//! `lattica-protocol`. The header's 16 extension bits are shared state
//! between them: a block-type nibble for typed messages, a hash count for
//! votes and requests, and query/response flags for the handshake.

use lattica_blocks::{Block, BlockType, Vote};
use lattica_types::{BlockHash, PublicKey, Root, Signature};
use std::net::SocketAddr;
use std::sync::Arc;

/// Wire discriminants.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum MessageType {
    Invalid = 0x00,
    NotAType = 0x01,
    Keepalive = 0x02,
    Publish = 0x03,
    ConfirmReq = 0x04,
    ConfirmAck = 0x05,
    BulkPull = 0x06,
    BulkPush = 0x07,
    FrontierReq = 0x08,
    NodeIdHandshake = 0x0a,
    BulkPullAccount = 0x0b,
    TelemetryReq = 0x0c,
    TelemetryAck = 0x0d,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Invalid),
            0x01 => Some(Self::NotAType),
            0x02 => Some(Self::Keepalive),
            0x03 => Some(Self::Publish),
            0x04 => Some(Self::ConfirmReq),
            0x05 => Some(Self::ConfirmAck),
            0x06 => Some(Self::BulkPull),
            0x07 => Some(Self::BulkPush),
            0x08 => Some(Self::FrontierReq),
            0x0a => Some(Self::NodeIdHandshake),
            0x0b => Some(Self::BulkPullAccount),
            0x0c => Some(Self::TelemetryReq),
            0x0d => Some(Self::TelemetryAck),
            _ => None,
        }
    }
}

/// Extension bit assignments.
pub mod extensions {
    /// Block-type nibble for publish/confirm_req/confirm_ack.
    pub const BLOCK_TYPE_MASK: u16 = 0x0F00;
    pub const BLOCK_TYPE_SHIFT: u16 = 8;
    /// Item count for confirm_req-by-hash and confirm_ack.
    pub const COUNT_MASK: u16 = 0xF000;
    pub const COUNT_SHIFT: u16 = 12;
    /// node_id_handshake contents.
    pub const QUERY_FLAG: u16 = 0x0001;
    pub const RESPONSE_FLAG: u16 = 0x0002;
}

/// Fixed eight-byte wire header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub magic: [u8; 2],
    pub version_max: u8,
    pub version_using: u8,
    pub version_min: u8,
    pub message_type: MessageType,
    pub extensions: u16,
}

impl MessageHeader {
    pub const SIZE: usize = 8;

    pub fn block_type(&self) -> Option<BlockType> {
        let nibble =
            ((self.extensions & extensions::BLOCK_TYPE_MASK) >> extensions::BLOCK_TYPE_SHIFT) as u8;
        BlockType::from_u8(nibble)
    }

    pub fn set_block_type(&mut self, block_type: BlockType) {
        self.extensions &= !extensions::BLOCK_TYPE_MASK;
        self.extensions |= (block_type as u16) << extensions::BLOCK_TYPE_SHIFT;
    }

    pub fn count(&self) -> u8 {
        ((self.extensions & extensions::COUNT_MASK) >> extensions::COUNT_SHIFT) as u8
    }

    pub fn set_count(&mut self, count: u8) {
        debug_assert!(count <= 15);
        self.extensions &= !extensions::COUNT_MASK;
        self.extensions |= (count as u16) << extensions::COUNT_SHIFT;
    }
}

/// Eight peer slots, zero-filled when fewer are known.
pub const KEEPALIVE_PEERS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keepalive {
    pub peers: [Option<SocketAddr>; KEEPALIVE_PEERS],
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            peers: [None; KEEPALIVE_PEERS],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Publish {
    pub block: Arc<Block>,
}

/// Either a full block (legacy) or up to seven (hash, root) pairs.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfirmReq {
    pub block: Option<Arc<Block>>,
    pub roots_hashes: Vec<(BlockHash, Root)>,
}

#[derive(Clone, Debug)]
pub struct ConfirmAck {
    pub vote: Arc<Vote>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkPull {
    /// Account or block hash to start from.
    pub start: [u8; 32],
    /// Stop before this hash; zero walks to the open block.
    pub end: BlockHash,
    /// Maximum blocks to return; zero means unlimited.
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BulkPullAccount {
    pub account: PublicKey,
    pub minimum_amount: lattica_types::Amount,
    pub flags: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrontierReq {
    pub start: PublicKey,
    /// Only frontiers modified within this many seconds.
    pub age: u32,
    pub count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeIdHandshake {
    /// A 32-byte cookie the peer should sign.
    pub query: Option<[u8; 32]>,
    /// Our node id and the signature over their cookie.
    pub response: Option<(PublicKey, Signature)>,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TelemetryData {
    pub block_count: u64,
    pub cemented_count: u64,
    pub unchecked_count: u64,
    pub account_count: u64,
    pub bandwidth_cap: u64,
    pub peer_count: u32,
    pub protocol_version: u8,
    pub uptime_secs: u64,
    pub genesis_hash: BlockHash,
}

/// A parsed wire message.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    Keepalive(Keepalive),
    Publish(Publish),
    ConfirmReq(ConfirmReq),
    ConfirmAck(ConfirmAck),
    BulkPull(BulkPull),
    BulkPush,
    BulkPullAccount(BulkPullAccount),
    FrontierReq(FrontierReq),
    NodeIdHandshake(NodeIdHandshake),
    TelemetryReq,
    TelemetryAck(TelemetryData),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Keepalive(_) => MessageType::Keepalive,
            Message::Publish(_) => MessageType::Publish,
            Message::ConfirmReq(_) => MessageType::ConfirmReq,
            Message::ConfirmAck(_) => MessageType::ConfirmAck,
            Message::BulkPull(_) => MessageType::BulkPull,
            Message::BulkPush => MessageType::BulkPush,
            Message::BulkPullAccount(_) => MessageType::BulkPullAccount,
            Message::FrontierReq(_) => MessageType::FrontierReq,
            Message::NodeIdHandshake(_) => MessageType::NodeIdHandshake,
            Message::TelemetryReq => MessageType::TelemetryReq,
            Message::TelemetryAck(_) => MessageType::TelemetryAck,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> MessageHeader {
        MessageHeader {
            magic: *b"RX",
            version_max: 18,
            version_using: 18,
            version_min: 16,
            message_type: MessageType::Publish,
            extensions: 0,
        }
    }

    #[test]
    fn block_type_nibble_round_trip() {
        let mut h = header();
        h.set_block_type(BlockType::State);
        assert_eq!(h.block_type(), Some(BlockType::State));
        h.set_block_type(BlockType::Send);
        assert_eq!(h.block_type(), Some(BlockType::Send));
        // Count bits are untouched.
        assert_eq!(h.count(), 0);
    }

    #[test]
    fn count_bits_round_trip() {
        let mut h = header();
        h.set_block_type(BlockType::State);
        h.set_count(12);
        assert_eq!(h.count(), 12);
        assert_eq!(h.block_type(), Some(BlockType::State));
    }

    #[test]
    fn message_type_codes_match_wire() {
        assert_eq!(MessageType::Keepalive as u8, 0x02);
        assert_eq!(MessageType::NodeIdHandshake as u8, 0x0a);
        assert_eq!(MessageType::from_u8(0x05), Some(MessageType::ConfirmAck));
        assert_eq!(MessageType::from_u8(0x09), None);
    }
}
