//! Confirmation-height table: account → (height, frontier).

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;
use lattica_types::{BlockHash, PublicKey};

/// Cemented progress for one account; monotonically non-decreasing.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ConfirmationHeightInfo {
    pub height: u64,
    pub frontier: BlockHash,
}

impl ConfirmationHeightInfo {
    pub const SIZE: usize = 8 + 32;

    pub fn new(height: u64, frontier: BlockHash) -> Self {
        Self { height, frontier }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(self.frontier.as_bytes());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            height: u64::from_le_bytes(bytes[..8].try_into().unwrap()),
            frontier: BlockHash::new(bytes[8..].try_into().unwrap()),
        })
    }
}

pub trait ConfirmationHeightStore: Send + Sync {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        account: &PublicKey,
        info: &ConfirmationHeightInfo,
    ) -> Result<(), StoreError>;

    fn get(&self, txn: &dyn Transaction, account: &PublicKey) -> Option<ConfirmationHeightInfo>;

    fn del(&self, txn: &mut dyn WriteTransaction, account: &PublicKey) -> Result<(), StoreError>;

    fn for_each(
        &self,
        txn: &dyn Transaction,
        f: &mut dyn FnMut(&PublicKey, &ConfirmationHeightInfo) -> bool,
    );

    /// Remove every entry; used by tests and ledger resets.
    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError>;
}
