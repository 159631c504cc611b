//! Online-weight table: sample timestamp → observed online stake.

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;
use lattica_types::Amount;

pub trait OnlineWeightStore: Send + Sync {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        timestamp: u64,
        amount: &Amount,
    ) -> Result<(), StoreError>;

    fn del(&self, txn: &mut dyn WriteTransaction, timestamp: u64) -> Result<(), StoreError>;

    /// Iterate samples in ascending timestamp order.
    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(u64, &Amount) -> bool);

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError>;
}
