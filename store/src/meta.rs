//! Meta table: well-known 32-byte keys for schema scalars.

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u64 = 1;

/// Well-known key holding the schema version.
pub const VERSION_KEY: [u8; 32] = {
    let mut key = [0u8; 32];
    key[31] = 1;
    key
};

pub trait MetaStore: Send + Sync {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        key: &[u8; 32],
        value: &[u8; 32],
    ) -> Result<(), StoreError>;

    fn get(&self, txn: &dyn Transaction, key: &[u8; 32]) -> Option<[u8; 32]>;

    fn del(&self, txn: &mut dyn WriteTransaction, key: &[u8; 32]) -> Result<(), StoreError>;

    /// Read the schema version; defaults to the current version on a fresh
    /// database.
    fn version(&self, txn: &dyn Transaction) -> u64 {
        self.get(txn, &VERSION_KEY)
            .map(|value| u64::from_le_bytes(value[..8].try_into().unwrap()))
            .unwrap_or(SCHEMA_VERSION)
    }

    fn version_put(&self, txn: &mut dyn WriteTransaction, version: u64) -> Result<(), StoreError> {
        let mut value = [0u8; 32];
        value[..8].copy_from_slice(&version.to_le_bytes());
        self.put(txn, &VERSION_KEY, &value)
    }
}
