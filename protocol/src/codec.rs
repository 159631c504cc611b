//! Binary message codec.
//!
//! Every message is one header plus a fixed-layout body; integers are
//! little-endian except balances, which ride big-endian inside block
//! bodies. Deserialization never panics on malformed input: any structural
//! problem maps to a `ProtocolError`.

use crate::version::{PROTOCOL_VERSION_MAX, PROTOCOL_VERSION_MIN, PROTOCOL_VERSION_USING};
use lattica_blocks::{Block, BlockType, Vote, VotePayload, MAX_VOTE_HASHES};
use lattica_messages::{
    extensions, BulkPull, BulkPullAccount, ConfirmAck, ConfirmReq, FrontierReq, Keepalive,
    Message, MessageHeader, MessageType, NodeIdHandshake, Publish, TelemetryData,
    KEEPALIVE_PEERS,
};
use lattica_types::{Amount, BlockHash, PublicKey, Root, Signature};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("wrong network magic")]
    BadMagic,
    #[error("unknown message type {0:#04x}")]
    UnknownType(u8),
    #[error("message truncated or carries trailing bytes")]
    Truncated,
    #[error("malformed block body")]
    InvalidBlock,
    #[error("invalid item count")]
    InvalidCount,
    #[error("peer protocol version {0} is below the supported minimum")]
    VersionTooOld(u8),
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let slice = self
            .bytes
            .get(self.pos..self.pos + len)
            .ok_or(ProtocolError::Truncated)?;
        self.pos += len;
        Ok(slice)
    }

    fn take32(&mut self) -> Result<[u8; 32], ProtocolError> {
        Ok(self.take(32)?.try_into().unwrap())
    }

    fn take_u16_le(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn take_u32_le(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn take_u64_le(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn finish(&self) -> Result<(), ProtocolError> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(ProtocolError::Truncated)
        }
    }
}

fn write_header(out: &mut Vec<u8>, header: &MessageHeader) {
    out.extend_from_slice(&header.magic);
    out.push(header.version_max);
    out.push(header.version_using);
    out.push(header.version_min);
    out.push(header.message_type as u8);
    out.extend_from_slice(&header.extensions.to_le_bytes());
}

fn make_header(magic: [u8; 2], message: &Message) -> MessageHeader {
    let mut header = MessageHeader {
        magic,
        version_max: PROTOCOL_VERSION_MAX,
        version_using: PROTOCOL_VERSION_USING,
        version_min: PROTOCOL_VERSION_MIN,
        message_type: message.message_type(),
        extensions: 0,
    };
    match message {
        Message::Publish(publish) => header.set_block_type(publish.block.block_type()),
        Message::ConfirmReq(req) => match &req.block {
            Some(block) => header.set_block_type(block.block_type()),
            None => {
                header.set_block_type(BlockType::NotABlock);
                header.set_count(req.roots_hashes.len() as u8);
            }
        },
        Message::ConfirmAck(ack) => match &ack.vote.payload {
            VotePayload::Block(block) => header.set_block_type(block.block_type()),
            VotePayload::Hashes(hashes) => {
                header.set_block_type(BlockType::NotABlock);
                header.set_count(hashes.len() as u8);
            }
        },
        Message::NodeIdHandshake(handshake) => {
            if handshake.query.is_some() {
                header.extensions |= extensions::QUERY_FLAG;
            }
            if handshake.response.is_some() {
                header.extensions |= extensions::RESPONSE_FLAG;
            }
        }
        _ => {}
    }
    header
}

fn write_endpoint(out: &mut Vec<u8>, peer: &Option<SocketAddr>) {
    match peer {
        Some(addr) => {
            let v6 = match addr.ip() {
                IpAddr::V4(v4) => v4.to_ipv6_mapped(),
                IpAddr::V6(v6) => v6,
            };
            out.extend_from_slice(&v6.octets());
            out.extend_from_slice(&addr.port().to_le_bytes());
        }
        None => out.extend_from_slice(&[0u8; 18]),
    }
}

fn read_endpoint(reader: &mut Reader) -> Result<Option<SocketAddr>, ProtocolError> {
    let octets: [u8; 16] = reader.take(16)?.try_into().unwrap();
    let port = reader.take_u16_le()?;
    let v6 = Ipv6Addr::from(octets);
    if v6.is_unspecified() && port == 0 {
        return Ok(None);
    }
    let ip = match v6.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(v6),
    };
    Ok(Some(SocketAddr::new(ip, port)))
}

/// Encode `message` for the network identified by `magic`.
pub fn serialize_message(message: &Message, magic: [u8; 2]) -> Vec<u8> {
    let header = make_header(magic, message);
    let mut out = Vec::with_capacity(MessageHeader::SIZE + 256);
    write_header(&mut out, &header);
    match message {
        Message::Keepalive(keepalive) => {
            for peer in &keepalive.peers {
                write_endpoint(&mut out, peer);
            }
        }
        Message::Publish(publish) => publish.block.serialize(&mut out),
        Message::ConfirmReq(req) => match &req.block {
            Some(block) => block.serialize(&mut out),
            None => {
                for (hash, root) in &req.roots_hashes {
                    out.extend_from_slice(hash.as_bytes());
                    out.extend_from_slice(root.as_bytes());
                }
            }
        },
        Message::ConfirmAck(ack) => {
            out.extend_from_slice(ack.vote.voting_account.as_bytes());
            out.extend_from_slice(ack.vote.signature.as_bytes());
            out.extend_from_slice(&ack.vote.sequence.to_le_bytes());
            match &ack.vote.payload {
                VotePayload::Block(block) => block.serialize(&mut out),
                VotePayload::Hashes(hashes) => {
                    for hash in hashes {
                        out.extend_from_slice(hash.as_bytes());
                    }
                }
            }
        }
        Message::BulkPull(pull) => {
            out.extend_from_slice(&pull.start);
            out.extend_from_slice(pull.end.as_bytes());
            out.extend_from_slice(&pull.count.to_le_bytes());
        }
        Message::BulkPush | Message::TelemetryReq => {}
        Message::BulkPullAccount(pull) => {
            out.extend_from_slice(pull.account.as_bytes());
            out.extend_from_slice(&pull.minimum_amount.to_be_bytes());
            out.push(pull.flags);
        }
        Message::FrontierReq(req) => {
            out.extend_from_slice(req.start.as_bytes());
            out.extend_from_slice(&req.age.to_le_bytes());
            out.extend_from_slice(&req.count.to_le_bytes());
        }
        Message::NodeIdHandshake(handshake) => {
            if let Some(query) = &handshake.query {
                out.extend_from_slice(query);
            }
            if let Some((node_id, signature)) = &handshake.response {
                out.extend_from_slice(node_id.as_bytes());
                out.extend_from_slice(signature.as_bytes());
            }
        }
        Message::TelemetryAck(data) => {
            out.extend_from_slice(&data.block_count.to_le_bytes());
            out.extend_from_slice(&data.cemented_count.to_le_bytes());
            out.extend_from_slice(&data.unchecked_count.to_le_bytes());
            out.extend_from_slice(&data.account_count.to_le_bytes());
            out.extend_from_slice(&data.bandwidth_cap.to_le_bytes());
            out.extend_from_slice(&data.peer_count.to_le_bytes());
            out.push(data.protocol_version);
            out.extend_from_slice(&data.uptime_secs.to_le_bytes());
            out.extend_from_slice(data.genesis_hash.as_bytes());
        }
    }
    out
}

fn read_block(reader: &mut Reader, block_type: BlockType) -> Result<Arc<Block>, ProtocolError> {
    let size = block_type.size();
    if size == 0 {
        return Err(ProtocolError::InvalidBlock);
    }
    let body = reader.take(size)?;
    Block::deserialize(block_type, body)
        .map(Arc::new)
        .ok_or(ProtocolError::InvalidBlock)
}

/// Decode one complete message. `magic` is the expected network marker;
/// mismatches are rejected before anything else is parsed.
pub fn deserialize_message(bytes: &[u8], magic: [u8; 2]) -> Result<Message, ProtocolError> {
    let mut reader = Reader::new(bytes);
    let header_magic: [u8; 2] = reader.take(2)?.try_into().unwrap();
    if header_magic != magic {
        return Err(ProtocolError::BadMagic);
    }
    let _version_max = reader.take(1)?[0];
    let version_using = reader.take(1)?[0];
    let _version_min = reader.take(1)?[0];
    if version_using < PROTOCOL_VERSION_MIN {
        return Err(ProtocolError::VersionTooOld(version_using));
    }
    let type_byte = reader.take(1)?[0];
    let message_type =
        MessageType::from_u8(type_byte).ok_or(ProtocolError::UnknownType(type_byte))?;
    let extensions = reader.take_u16_le()?;
    let header = MessageHeader {
        magic: header_magic,
        version_max: _version_max,
        version_using,
        version_min: _version_min,
        message_type,
        extensions,
    };

    let message = match message_type {
        MessageType::Invalid | MessageType::NotAType => {
            return Err(ProtocolError::UnknownType(type_byte))
        }
        MessageType::Keepalive => {
            let mut keepalive = Keepalive::default();
            for slot in keepalive.peers.iter_mut().take(KEEPALIVE_PEERS) {
                *slot = read_endpoint(&mut reader)?;
            }
            Message::Keepalive(keepalive)
        }
        MessageType::Publish => {
            let block_type = header.block_type().ok_or(ProtocolError::InvalidBlock)?;
            Message::Publish(Publish {
                block: read_block(&mut reader, block_type)?,
            })
        }
        MessageType::ConfirmReq => {
            let block_type = header.block_type().ok_or(ProtocolError::InvalidBlock)?;
            if block_type == BlockType::NotABlock {
                let count = header.count() as usize;
                if count == 0 || count > crate::codec::CONFIRM_REQ_MAX {
                    return Err(ProtocolError::InvalidCount);
                }
                let mut roots_hashes = Vec::with_capacity(count);
                for _ in 0..count {
                    let hash = BlockHash::new(reader.take32()?);
                    let root = Root::new(reader.take32()?);
                    roots_hashes.push((hash, root));
                }
                Message::ConfirmReq(ConfirmReq {
                    block: None,
                    roots_hashes,
                })
            } else {
                Message::ConfirmReq(ConfirmReq {
                    block: Some(read_block(&mut reader, block_type)?),
                    roots_hashes: Vec::new(),
                })
            }
        }
        MessageType::ConfirmAck => {
            let voting_account = PublicKey::new(reader.take32()?);
            let signature = Signature::new(reader.take(64)?.try_into().unwrap());
            let sequence = reader.take_u64_le()?;
            let block_type = header.block_type().ok_or(ProtocolError::InvalidBlock)?;
            let payload = if block_type == BlockType::NotABlock {
                let count = header.count() as usize;
                if count == 0 || count > MAX_VOTE_HASHES {
                    return Err(ProtocolError::InvalidCount);
                }
                let mut hashes = Vec::with_capacity(count);
                for _ in 0..count {
                    hashes.push(BlockHash::new(reader.take32()?));
                }
                VotePayload::Hashes(hashes)
            } else {
                VotePayload::Block(read_block(&mut reader, block_type)?)
            };
            Message::ConfirmAck(ConfirmAck {
                vote: Arc::new(Vote {
                    voting_account,
                    signature,
                    sequence,
                    payload,
                }),
            })
        }
        MessageType::BulkPull => Message::BulkPull(BulkPull {
            start: reader.take32()?,
            end: BlockHash::new(reader.take32()?),
            count: reader.take_u32_le()?,
        }),
        MessageType::BulkPush => Message::BulkPush,
        MessageType::BulkPullAccount => Message::BulkPullAccount(BulkPullAccount {
            account: PublicKey::new(reader.take32()?),
            minimum_amount: Amount::from_be_bytes(reader.take(16)?.try_into().unwrap()),
            flags: reader.take(1)?[0],
        }),
        MessageType::FrontierReq => Message::FrontierReq(FrontierReq {
            start: PublicKey::new(reader.take32()?),
            age: reader.take_u32_le()?,
            count: reader.take_u32_le()?,
        }),
        MessageType::NodeIdHandshake => {
            let query = if extensions & extensions::QUERY_FLAG != 0 {
                Some(reader.take32()?)
            } else {
                None
            };
            let response = if extensions & extensions::RESPONSE_FLAG != 0 {
                let node_id = PublicKey::new(reader.take32()?);
                let signature = Signature::new(reader.take(64)?.try_into().unwrap());
                Some((node_id, signature))
            } else {
                None
            };
            Message::NodeIdHandshake(NodeIdHandshake { query, response })
        }
        MessageType::TelemetryReq => Message::TelemetryReq,
        MessageType::TelemetryAck => Message::TelemetryAck(TelemetryData {
            block_count: reader.take_u64_le()?,
            cemented_count: reader.take_u64_le()?,
            unchecked_count: reader.take_u64_le()?,
            account_count: reader.take_u64_le()?,
            bandwidth_cap: reader.take_u64_le()?,
            peer_count: reader.take_u32_le()?,
            protocol_version: reader.take(1)?[0],
            uptime_secs: reader.take_u64_le()?,
            genesis_hash: BlockHash::new(reader.take32()?),
        }),
    };
    reader.finish()?;
    Ok(message)
}

/// Wire cap on (hash, root) pairs per confirm_req.
pub const CONFIRM_REQ_MAX: usize = 7;
