//! Account table: account → account info.

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;
use lattica_types::{Amount, BlockHash, Epoch, PublicKey};

/// Head-of-chain state for one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub head: BlockHash,
    pub representative: PublicKey,
    pub open_block: BlockHash,
    pub balance: Amount,
    /// Seconds since epoch of the last modification.
    pub modified: u64,
    pub block_count: u64,
    pub epoch: Epoch,
}

impl AccountInfo {
    /// Fixed 129-byte storage layout.
    pub const SIZE: usize = 32 + 32 + 32 + 16 + 8 + 8 + 1;

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.head.as_bytes());
        out.extend_from_slice(self.representative.as_bytes());
        out.extend_from_slice(self.open_block.as_bytes());
        out.extend_from_slice(&self.balance.to_be_bytes());
        out.extend_from_slice(&self.modified.to_le_bytes());
        out.extend_from_slice(&self.block_count.to_le_bytes());
        out.push(self.epoch.as_u8());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        Some(Self {
            head: BlockHash::new(bytes[0..32].try_into().unwrap()),
            representative: PublicKey::new(bytes[32..64].try_into().unwrap()),
            open_block: BlockHash::new(bytes[64..96].try_into().unwrap()),
            balance: Amount::from_be_bytes(bytes[96..112].try_into().unwrap()),
            modified: u64::from_le_bytes(bytes[112..120].try_into().unwrap()),
            block_count: u64::from_le_bytes(bytes[120..128].try_into().unwrap()),
            epoch: Epoch::from_u8(bytes[128])?,
        })
    }
}

/// Visitor iteration returns `false` to stop early.
pub trait AccountStore: Send + Sync {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        account: &PublicKey,
        info: &AccountInfo,
    ) -> Result<(), StoreError>;

    fn get(&self, txn: &dyn Transaction, account: &PublicKey) -> Option<AccountInfo>;

    fn del(&self, txn: &mut dyn WriteTransaction, account: &PublicKey) -> Result<(), StoreError>;

    fn exists(&self, txn: &dyn Transaction, account: &PublicKey) -> bool {
        self.get(txn, account).is_some()
    }

    /// Iterate all accounts in key order.
    fn for_each(
        &self,
        txn: &dyn Transaction,
        f: &mut dyn FnMut(&PublicKey, &AccountInfo) -> bool,
    );

    /// Iterate accounts with keys ≥ `start` in key order.
    fn for_each_from(
        &self,
        txn: &dyn Transaction,
        start: &PublicKey,
        f: &mut dyn FnMut(&PublicKey, &AccountInfo) -> bool,
    );
}
