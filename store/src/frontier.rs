//! Frontier table: head hash → account (legacy secondary index).
//!
//! Empty in the current schema except while `rebuild_db` repopulates it;
//! kept because legacy bootstrap servers answer frontier scans from it.

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;
use lattica_types::{BlockHash, PublicKey};

pub trait FrontierStore: Send + Sync {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        hash: &BlockHash,
        account: &PublicKey,
    ) -> Result<(), StoreError>;

    fn get(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<PublicKey>;

    fn del(&self, txn: &mut dyn WriteTransaction, hash: &BlockHash) -> Result<(), StoreError>;

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&BlockHash, &PublicKey) -> bool);
}
