//! Unchecked table: blocks waiting for a missing predecessor or source.

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;
use lattica_blocks::Block;
use lattica_types::{BlockHash, PublicKey};

/// (dependency hash, block hash). The dependency is the missing previous or
/// source block this entry waits on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct UncheckedKey {
    pub dependency: BlockHash,
    pub hash: BlockHash,
}

impl UncheckedKey {
    pub const SIZE: usize = 64;

    pub fn new(dependency: BlockHash, hash: BlockHash) -> Self {
        Self { dependency, hash }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.dependency.as_bytes());
        out[32..].copy_from_slice(self.hash.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            dependency: BlockHash::new(bytes[..32].try_into().unwrap()),
            hash: BlockHash::new(bytes[32..].try_into().unwrap()),
        })
    }
}

/// Signature pre-verification state carried with an unchecked block, so the
/// pipeline can skip re-verifying on requeue.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum SignatureVerification {
    Unknown = 0,
    Invalid = 1,
    Valid = 2,
    /// Valid and signed by an epoch signer.
    ValidEpoch = 3,
}

impl SignatureVerification {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::Invalid),
            2 => Some(Self::Valid),
            3 => Some(Self::ValidEpoch),
            _ => None,
        }
    }
}

/// A block parked until its dependency arrives.
#[derive(Clone, Debug)]
pub struct UncheckedInfo {
    pub block: Block,
    /// Best-known owning account; zero when unknown.
    pub account: PublicKey,
    /// Seconds since epoch when the block arrived.
    pub modified: u64,
    pub verified: SignatureVerification,
}

impl UncheckedInfo {
    pub fn new(block: Block, account: PublicKey, modified: u64) -> Self {
        Self {
            block,
            account,
            modified,
            verified: SignatureVerification::Unknown,
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        self.block.serialize_with_type(out);
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(&self.modified.to_le_bytes());
        out.push(self.verified as u8);
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        // Block length is type-determined, so split from the front.
        let (&type_byte, _) = bytes.split_first()?;
        let block_type = lattica_blocks::BlockType::from_u8(type_byte)?;
        let block_len = 1 + block_type.size();
        let tail = bytes.get(block_len..)?;
        if tail.len() != 32 + 8 + 1 {
            return None;
        }
        let block = Block::deserialize_with_type(&bytes[..block_len])?;
        Some(Self {
            block,
            account: PublicKey::new(tail[..32].try_into().unwrap()),
            modified: u64::from_le_bytes(tail[32..40].try_into().unwrap()),
            verified: SignatureVerification::from_u8(tail[40])?,
        })
    }
}

pub trait UncheckedStore: Send + Sync {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        key: &UncheckedKey,
        info: &UncheckedInfo,
    ) -> Result<(), StoreError>;

    fn get(&self, txn: &dyn Transaction, dependency: &BlockHash) -> Vec<UncheckedInfo>;

    fn del(&self, txn: &mut dyn WriteTransaction, key: &UncheckedKey) -> Result<(), StoreError>;

    fn exists(&self, txn: &dyn Transaction, key: &UncheckedKey) -> bool;

    fn for_each(
        &self,
        txn: &dyn Transaction,
        f: &mut dyn FnMut(&UncheckedKey, &UncheckedInfo) -> bool,
    );

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError>;
}
