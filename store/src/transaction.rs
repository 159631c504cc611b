//! Transaction handles.
//!
//! Backends downcast through `as_any` to their concrete transaction types;
//! callers never see backend cursor details. Read transactions snapshot at
//! begin and may be refreshed; write transactions must be committed
//! explicitly and are exclusive process-wide.
//!
//! Transactions are deliberately not `Send`: LMDB read transactions are
//! pinned to their creating thread, so every processing thread begins and
//! finishes its own.

use crate::StoreError;
use std::any::Any;

pub trait Transaction {
    fn as_any(&self) -> &dyn Any;
}

pub trait ReadTransaction: Transaction {
    /// Drop and reacquire the snapshot, picking up committed writes.
    fn refresh(&mut self);

    fn as_transaction(&self) -> &dyn Transaction;
}

pub trait WriteTransaction: Transaction {
    /// Commit buffered writes. A dropped, uncommitted transaction aborts.
    fn commit(&mut self) -> Result<(), StoreError>;

    /// Commit, then immediately begin a fresh write transaction in place.
    fn renew(&mut self) -> Result<(), StoreError>;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn as_transaction(&self) -> &dyn Transaction;
}
