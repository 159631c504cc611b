//! LMDB storage backend.
//!
//! One memory-mapped environment with a named database per logical table.
//! LMDB gives MVCC reads and a single writer, which lines up exactly with
//! the store contract: many concurrent read transactions, one write
//! transaction serialized by the write-database queue above us.

mod environment;
mod store;
mod tables;
mod transaction;

pub use environment::LmdbConfig;
pub use store::LmdbStore;
pub use transaction::{LmdbReadTransaction, LmdbWriteTransaction};

use lattica_store::StoreError;

fn map_err(error: heed::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}
