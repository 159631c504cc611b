//! RocksDB storage backend.
//!
//! One database with a column family per logical table. Read transactions
//! pin a RocksDB snapshot; write transactions buffer into a `WriteBatch`
//! with a sorted overlay so they see their own writes, and commit the batch
//! atomically. Table counts are maintained as cached counters, giving the
//! O(1) `count` the LSM backend advertises.

mod store;
mod transaction;

pub use store::{RocksDbConfig, RocksDbStore};
pub use transaction::{RocksReadTransaction, RocksWriteTransaction};

use lattica_store::{StoreError, Table};

fn map_err(error: rocksdb::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

pub(crate) fn table_index(table: Table) -> usize {
    Table::ALL
        .iter()
        .position(|t| *t == table)
        .expect("table registered")
}
