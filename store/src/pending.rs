//! Pending table: unreceived sends, keyed by (destination, send hash).

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;
use lattica_types::{Amount, BlockHash, Epoch, PublicKey};

/// (destination account, sending block hash).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PendingKey {
    pub account: PublicKey,
    pub hash: BlockHash,
}

impl PendingKey {
    pub const SIZE: usize = 64;

    pub fn new(account: PublicKey, hash: BlockHash) -> Self {
        Self { account, hash }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(self.account.as_bytes());
        out[32..].copy_from_slice(self.hash.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            account: PublicKey::new(bytes[..32].try_into().unwrap()),
            hash: BlockHash::new(bytes[32..].try_into().unwrap()),
        })
    }
}

/// The source side of an unreceived send.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PendingInfo {
    pub source: PublicKey,
    pub amount: Amount,
    pub epoch: Epoch,
}

impl PendingInfo {
    pub const SIZE: usize = 32 + 16 + 1;

    pub fn new(source: PublicKey, amount: Amount, epoch: Epoch) -> Self {
        Self {
            source,
            amount,
            epoch,
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.source.as_bytes());
        out.extend_from_slice(&self.amount.to_be_bytes());
        out.push(self.epoch.as_u8());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            source: PublicKey::new(bytes[..32].try_into().unwrap()),
            amount: Amount::from_be_bytes(bytes[32..48].try_into().unwrap()),
            epoch: Epoch::from_u8(bytes[48])?,
        })
    }
}

pub trait PendingStore: Send + Sync {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        key: &PendingKey,
        info: &PendingInfo,
    ) -> Result<(), StoreError>;

    fn get(&self, txn: &dyn Transaction, key: &PendingKey) -> Option<PendingInfo>;

    fn del(&self, txn: &mut dyn WriteTransaction, key: &PendingKey) -> Result<(), StoreError>;

    fn exists(&self, txn: &dyn Transaction, key: &PendingKey) -> bool {
        self.get(txn, key).is_some()
    }

    /// Iterate entries with keys ≥ `start` in key-byte order; because the
    /// destination account leads the key, one account's entries are
    /// contiguous.
    fn for_each_from(
        &self,
        txn: &dyn Transaction,
        start: &PendingKey,
        f: &mut dyn FnMut(&PendingKey, &PendingInfo) -> bool,
    );

    /// Whether `account` has any pending entry.
    fn any(&self, txn: &dyn Transaction, account: &PublicKey) -> bool {
        let mut found = false;
        self.for_each_from(
            txn,
            &PendingKey::new(*account, BlockHash::ZERO),
            &mut |key, _| {
                found = key.account == *account;
                false
            },
        );
        found
    }
}
