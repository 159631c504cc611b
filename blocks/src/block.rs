//! The five block variants and their shared behavioral surface.
//!
//! A block's hash covers the type-specific hashables only: signature, work
//! and sideband are attached afterwards and never feed the digest. State
//! blocks prepend a 32-byte domain preamble so their hashes can never
//! collide with legacy blocks sharing field bytes.

use crate::sideband::BlockSideband;
use lattica_types::{Amount, BlockHash, Link, PublicKey, Root, Signature};
use lattica_crypto::Blake2bHasher;
use std::fmt;
use std::sync::OnceLock;

/// Wire discriminant for block serialization.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum BlockType {
    Invalid = 0,
    NotABlock = 1,
    Send = 2,
    Receive = 3,
    Open = 4,
    Change = 5,
    State = 6,
}

impl BlockType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BlockType::Invalid),
            1 => Some(BlockType::NotABlock),
            2 => Some(BlockType::Send),
            3 => Some(BlockType::Receive),
            4 => Some(BlockType::Open),
            5 => Some(BlockType::Change),
            6 => Some(BlockType::State),
            _ => None,
        }
    }

    /// Serialized size of the block body (without the type byte).
    pub fn size(self) -> usize {
        match self {
            BlockType::Send => SendBlock::SIZE,
            BlockType::Receive => ReceiveBlock::SIZE,
            BlockType::Open => OpenBlock::SIZE,
            BlockType::Change => ChangeBlock::SIZE,
            BlockType::State => StateBlock::SIZE,
            BlockType::Invalid | BlockType::NotABlock => 0,
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BlockType::Invalid => "invalid",
            BlockType::NotABlock => "not_a_block",
            BlockType::Send => "send",
            BlockType::Receive => "receive",
            BlockType::Open => "open",
            BlockType::Change => "change",
            BlockType::State => "state",
        };
        f.write_str(name)
    }
}

// ── Field codec helpers ──────────────────────────────────────────────────

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take32(&mut self) -> Option<[u8; 32]> {
        let slice = self.bytes.get(self.pos..self.pos + 32)?;
        self.pos += 32;
        Some(slice.try_into().unwrap())
    }

    fn take64(&mut self) -> Option<[u8; 64]> {
        let slice = self.bytes.get(self.pos..self.pos + 64)?;
        self.pos += 64;
        Some(slice.try_into().unwrap())
    }

    fn take_u128_be(&mut self) -> Option<u128> {
        let slice = self.bytes.get(self.pos..self.pos + 16)?;
        self.pos += 16;
        Some(u128::from_be_bytes(slice.try_into().unwrap()))
    }

    fn take_u64_le(&mut self) -> Option<u64> {
        let slice = self.bytes.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        Some(u64::from_le_bytes(slice.try_into().unwrap()))
    }

    fn exhausted(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

// ── Send ─────────────────────────────────────────────────────────────────

/// Legacy send: debits the account by the difference to `balance`.
#[derive(Clone, Debug)]
pub struct SendBlock {
    pub previous: BlockHash,
    pub destination: PublicKey,
    /// Balance *after* the send.
    pub balance: Amount,
    pub signature: Signature,
    pub work: u64,
    sideband: Option<BlockSideband>,
    cached_hash: OnceLock<BlockHash>,
}

impl SendBlock {
    pub const SIZE: usize = 32 + 32 + 16 + 64 + 8;

    pub fn new(previous: BlockHash, destination: PublicKey, balance: Amount) -> Self {
        Self {
            previous,
            destination,
            balance,
            signature: Signature::ZERO,
            work: 0,
            sideband: None,
            cached_hash: OnceLock::new(),
        }
    }

    pub fn hash(&self) -> BlockHash {
        *self.cached_hash.get_or_init(|| {
            let mut hasher = Blake2bHasher::new();
            hasher
                .update(self.previous.as_bytes())
                .update(self.destination.as_bytes())
                .update(&self.balance.to_be_bytes());
            BlockHash::new(hasher.finalize())
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.previous.as_bytes());
        out.extend_from_slice(self.destination.as_bytes());
        out.extend_from_slice(&self.balance.to_be_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let previous = BlockHash::new(r.take32()?);
        let destination = PublicKey::new(r.take32()?);
        let balance = Amount::raw(r.take_u128_be()?);
        let signature = Signature::new(r.take64()?);
        let work = r.take_u64_le()?;
        r.exhausted().then(|| Self {
            previous,
            destination,
            balance,
            signature,
            work,
            sideband: None,
            cached_hash: OnceLock::new(),
        })
    }
}

// ── Receive ──────────────────────────────────────────────────────────────

/// Legacy receive: credits the amount of the `source` send.
#[derive(Clone, Debug)]
pub struct ReceiveBlock {
    pub previous: BlockHash,
    pub source: BlockHash,
    pub signature: Signature,
    pub work: u64,
    sideband: Option<BlockSideband>,
    cached_hash: OnceLock<BlockHash>,
}

impl ReceiveBlock {
    pub const SIZE: usize = 32 + 32 + 64 + 8;

    pub fn new(previous: BlockHash, source: BlockHash) -> Self {
        Self {
            previous,
            source,
            signature: Signature::ZERO,
            work: 0,
            sideband: None,
            cached_hash: OnceLock::new(),
        }
    }

    pub fn hash(&self) -> BlockHash {
        *self.cached_hash.get_or_init(|| {
            let mut hasher = Blake2bHasher::new();
            hasher
                .update(self.previous.as_bytes())
                .update(self.source.as_bytes());
            BlockHash::new(hasher.finalize())
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.previous.as_bytes());
        out.extend_from_slice(self.source.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let previous = BlockHash::new(r.take32()?);
        let source = BlockHash::new(r.take32()?);
        let signature = Signature::new(r.take64()?);
        let work = r.take_u64_le()?;
        r.exhausted().then(|| Self {
            previous,
            source,
            signature,
            work,
            sideband: None,
            cached_hash: OnceLock::new(),
        })
    }
}

// ── Open ─────────────────────────────────────────────────────────────────

/// Legacy open: the first block of an account chain.
#[derive(Clone, Debug)]
pub struct OpenBlock {
    pub source: BlockHash,
    pub representative: PublicKey,
    pub account: PublicKey,
    pub signature: Signature,
    pub work: u64,
    sideband: Option<BlockSideband>,
    cached_hash: OnceLock<BlockHash>,
}

impl OpenBlock {
    pub const SIZE: usize = 32 + 32 + 32 + 64 + 8;

    pub fn new(source: BlockHash, representative: PublicKey, account: PublicKey) -> Self {
        Self {
            source,
            representative,
            account,
            signature: Signature::ZERO,
            work: 0,
            sideband: None,
            cached_hash: OnceLock::new(),
        }
    }

    pub fn hash(&self) -> BlockHash {
        *self.cached_hash.get_or_init(|| {
            let mut hasher = Blake2bHasher::new();
            hasher
                .update(self.source.as_bytes())
                .update(self.representative.as_bytes())
                .update(self.account.as_bytes());
            BlockHash::new(hasher.finalize())
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.source.as_bytes());
        out.extend_from_slice(self.representative.as_bytes());
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let source = BlockHash::new(r.take32()?);
        let representative = PublicKey::new(r.take32()?);
        let account = PublicKey::new(r.take32()?);
        let signature = Signature::new(r.take64()?);
        let work = r.take_u64_le()?;
        r.exhausted().then(|| Self {
            source,
            representative,
            account,
            signature,
            work,
            sideband: None,
            cached_hash: OnceLock::new(),
        })
    }
}

// ── Change ───────────────────────────────────────────────────────────────

/// Legacy representative change; moves no funds.
#[derive(Clone, Debug)]
pub struct ChangeBlock {
    pub previous: BlockHash,
    pub representative: PublicKey,
    pub signature: Signature,
    pub work: u64,
    sideband: Option<BlockSideband>,
    cached_hash: OnceLock<BlockHash>,
}

impl ChangeBlock {
    pub const SIZE: usize = 32 + 32 + 64 + 8;

    pub fn new(previous: BlockHash, representative: PublicKey) -> Self {
        Self {
            previous,
            representative,
            signature: Signature::ZERO,
            work: 0,
            sideband: None,
            cached_hash: OnceLock::new(),
        }
    }

    pub fn hash(&self) -> BlockHash {
        *self.cached_hash.get_or_init(|| {
            let mut hasher = Blake2bHasher::new();
            hasher
                .update(self.previous.as_bytes())
                .update(self.representative.as_bytes());
            BlockHash::new(hasher.finalize())
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.previous.as_bytes());
        out.extend_from_slice(self.representative.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let previous = BlockHash::new(r.take32()?);
        let representative = PublicKey::new(r.take32()?);
        let signature = Signature::new(r.take64()?);
        let work = r.take_u64_le()?;
        r.exhausted().then(|| Self {
            previous,
            representative,
            signature,
            work,
            sideband: None,
            cached_hash: OnceLock::new(),
        })
    }
}

// ── State ────────────────────────────────────────────────────────────────

/// The modern universal block: carries the full account state, with `link`
/// overloaded as destination, source or epoch marker.
#[derive(Clone, Debug)]
pub struct StateBlock {
    pub account: PublicKey,
    pub previous: BlockHash,
    pub representative: PublicKey,
    pub balance: Amount,
    pub link: Link,
    pub signature: Signature,
    pub work: u64,
    sideband: Option<BlockSideband>,
    cached_hash: OnceLock<BlockHash>,
}

impl StateBlock {
    pub const SIZE: usize = 32 + 32 + 32 + 16 + 32 + 64 + 8;

    /// Domain preamble: 31 zero bytes then the state discriminant.
    fn preamble() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[31] = BlockType::State as u8;
        bytes
    }

    pub fn new(
        account: PublicKey,
        previous: BlockHash,
        representative: PublicKey,
        balance: Amount,
        link: Link,
    ) -> Self {
        Self {
            account,
            previous,
            representative,
            balance,
            link,
            signature: Signature::ZERO,
            work: 0,
            sideband: None,
            cached_hash: OnceLock::new(),
        }
    }

    pub fn hash(&self) -> BlockHash {
        *self.cached_hash.get_or_init(|| {
            let mut hasher = Blake2bHasher::new();
            hasher
                .update(&Self::preamble())
                .update(self.account.as_bytes())
                .update(self.previous.as_bytes())
                .update(self.representative.as_bytes())
                .update(&self.balance.to_be_bytes())
                .update(self.link.as_bytes());
            BlockHash::new(hasher.finalize())
        })
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(self.previous.as_bytes());
        out.extend_from_slice(self.representative.as_bytes());
        out.extend_from_slice(&self.balance.to_be_bytes());
        out.extend_from_slice(self.link.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.work.to_le_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        let mut r = Reader::new(bytes);
        let account = PublicKey::new(r.take32()?);
        let previous = BlockHash::new(r.take32()?);
        let representative = PublicKey::new(r.take32()?);
        let balance = Amount::raw(r.take_u128_be()?);
        let link = Link::new(r.take32()?);
        let signature = Signature::new(r.take64()?);
        let work = r.take_u64_le()?;
        r.exhausted().then(|| Self {
            account,
            previous,
            representative,
            balance,
            link,
            signature,
            work,
            sideband: None,
            cached_hash: OnceLock::new(),
        })
    }
}

// ── The polymorphic block ────────────────────────────────────────────────

/// Tagged variant over the five block kinds.
#[derive(Clone, Debug)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
    State(StateBlock),
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Block::Send(_) => BlockType::Send,
            Block::Receive(_) => BlockType::Receive,
            Block::Open(_) => BlockType::Open,
            Block::Change(_) => BlockType::Change,
            Block::State(_) => BlockType::State,
        }
    }

    pub fn hash(&self) -> BlockHash {
        match self {
            Block::Send(b) => b.hash(),
            Block::Receive(b) => b.hash(),
            Block::Open(b) => b.hash(),
            Block::Change(b) => b.hash(),
            Block::State(b) => b.hash(),
        }
    }

    /// The predecessor in the account chain; zero for open and first-state
    /// blocks.
    pub fn previous(&self) -> BlockHash {
        match self {
            Block::Send(b) => b.previous,
            Block::Receive(b) => b.previous,
            Block::Open(_) => BlockHash::ZERO,
            Block::Change(b) => b.previous,
            Block::State(b) => b.previous,
        }
    }

    /// The chain position this block contends for.
    pub fn root(&self) -> Root {
        match self {
            Block::Open(b) => Root::from(b.account),
            Block::State(b) if b.previous.is_zero() => Root::from(b.account),
            other => Root::from(other.previous()),
        }
    }

    pub fn qualified_root(&self) -> lattica_types::QualifiedRoot {
        lattica_types::QualifiedRoot::new(self.root(), self.previous())
    }

    /// The account field, where the type carries one.
    pub fn account_field(&self) -> Option<PublicKey> {
        match self {
            Block::Open(b) => Some(b.account),
            Block::State(b) => Some(b.account),
            _ => None,
        }
    }

    /// The explicit source hash for receive-shaped legacy blocks.
    pub fn source(&self) -> Option<BlockHash> {
        match self {
            Block::Receive(b) => Some(b.source),
            Block::Open(b) => Some(b.source),
            _ => None,
        }
    }

    /// The send destination, where the type carries one.
    pub fn destination(&self) -> Option<PublicKey> {
        match self {
            Block::Send(b) => Some(b.destination),
            _ => None,
        }
    }

    pub fn link(&self) -> Link {
        match self {
            Block::State(b) => b.link,
            _ => Link::ZERO,
        }
    }

    pub fn representative(&self) -> Option<PublicKey> {
        match self {
            Block::Open(b) => Some(b.representative),
            Block::Change(b) => Some(b.representative),
            Block::State(b) => Some(b.representative),
            _ => None,
        }
    }

    pub fn balance_field(&self) -> Option<Amount> {
        match self {
            Block::Send(b) => Some(b.balance),
            Block::State(b) => Some(b.balance),
            _ => None,
        }
    }

    pub fn work(&self) -> u64 {
        match self {
            Block::Send(b) => b.work,
            Block::Receive(b) => b.work,
            Block::Open(b) => b.work,
            Block::Change(b) => b.work,
            Block::State(b) => b.work,
        }
    }

    /// Replace the proof-of-work nonce. Work is not hashed, so the cached
    /// hash stays valid.
    pub fn set_work(&mut self, work: u64) {
        match self {
            Block::Send(b) => b.work = work,
            Block::Receive(b) => b.work = work,
            Block::Open(b) => b.work = work,
            Block::Change(b) => b.work = work,
            Block::State(b) => b.work = work,
        }
    }

    pub fn signature(&self) -> Signature {
        match self {
            Block::Send(b) => b.signature,
            Block::Receive(b) => b.signature,
            Block::Open(b) => b.signature,
            Block::Change(b) => b.signature,
            Block::State(b) => b.signature,
        }
    }

    pub fn set_signature(&mut self, signature: Signature) {
        match self {
            Block::Send(b) => b.signature = signature,
            Block::Receive(b) => b.signature = signature,
            Block::Open(b) => b.signature = signature,
            Block::Change(b) => b.signature = signature,
            Block::State(b) => b.signature = signature,
        }
    }

    pub fn sideband(&self) -> Option<&BlockSideband> {
        match self {
            Block::Send(b) => b.sideband.as_ref(),
            Block::Receive(b) => b.sideband.as_ref(),
            Block::Open(b) => b.sideband.as_ref(),
            Block::Change(b) => b.sideband.as_ref(),
            Block::State(b) => b.sideband.as_ref(),
        }
    }

    pub fn set_sideband(&mut self, sideband: BlockSideband) {
        let slot = match self {
            Block::Send(b) => &mut b.sideband,
            Block::Receive(b) => &mut b.sideband,
            Block::Open(b) => &mut b.sideband,
            Block::Change(b) => &mut b.sideband,
            Block::State(b) => &mut b.sideband,
        };
        *slot = Some(sideband);
    }

    /// Serialize the body only; the type is carried out of band (message
    /// header extensions or the store's leading type byte).
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Block::Send(b) => b.serialize(out),
            Block::Receive(b) => b.serialize(out),
            Block::Open(b) => b.serialize(out),
            Block::Change(b) => b.serialize(out),
            Block::State(b) => b.serialize(out),
        }
    }

    /// Serialize with a leading type byte.
    pub fn serialize_with_type(&self, out: &mut Vec<u8>) {
        out.push(self.block_type() as u8);
        self.serialize(out);
    }

    pub fn deserialize(block_type: BlockType, bytes: &[u8]) -> Option<Block> {
        match block_type {
            BlockType::Send => SendBlock::deserialize(bytes).map(Block::Send),
            BlockType::Receive => ReceiveBlock::deserialize(bytes).map(Block::Receive),
            BlockType::Open => OpenBlock::deserialize(bytes).map(Block::Open),
            BlockType::Change => ChangeBlock::deserialize(bytes).map(Block::Change),
            BlockType::State => StateBlock::deserialize(bytes).map(Block::State),
            BlockType::Invalid | BlockType::NotABlock => None,
        }
    }

    /// Inverse of `serialize_with_type`.
    pub fn deserialize_with_type(bytes: &[u8]) -> Option<Block> {
        let (&type_byte, body) = bytes.split_first()?;
        Self::deserialize(BlockType::from_u8(type_byte)?, body)
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.hash() == other.hash() && self.signature() == other.signature()
    }
}

impl Eq for Block {}
