//! Transaction wrappers.
//!
//! The store traits pass transactions as trait objects, so the heed
//! transaction lifetime is erased here. Each wrapper holds a clone of the
//! (internally reference-counted) `Env`, which keeps the environment alive
//! for at least as long as the transaction it carries; that is the invariant
//! the one `transmute` below relies on.

use crate::map_err;
use heed::{Env, RoTxn, RwTxn};
use lattica_store::{ReadTransaction, StoreError, Transaction, WriteTransaction};
use std::any::Any;

// Field order matters in both wrappers: the transaction is declared first
// so it drops before the environment handle that keeps the memory map
// alive.
pub struct LmdbReadTransaction {
    txn: Option<RoTxn<'static>>,
    env: Env,
}

impl LmdbReadTransaction {
    pub(crate) fn begin(env: &Env) -> Result<Self, StoreError> {
        let txn = env.clone().static_read_txn().map_err(map_err)?;
        Ok(Self {
            txn: Some(txn),
            env: env.clone(),
        })
    }

    pub(crate) fn ro(&self) -> &RoTxn<'static> {
        self.txn.as_ref().expect("read transaction active")
    }
}

impl Transaction for LmdbReadTransaction {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ReadTransaction for LmdbReadTransaction {
    fn refresh(&mut self) {
        self.txn = None;
        let txn = self
            .env
            .clone()
            .static_read_txn()
            .expect("reacquire read transaction");
        self.txn = Some(txn);
    }

    fn as_transaction(&self) -> &dyn Transaction {
        self
    }
}

pub struct LmdbWriteTransaction {
    txn: Option<RwTxn<'static>>,
    env: Env,
}

impl LmdbWriteTransaction {
    pub(crate) fn begin(env: &Env) -> Result<Self, StoreError> {
        let txn = env.write_txn().map_err(map_err)?;
        // SAFETY: the embedded `env` clone keeps the environment alive and
        // is declared after `txn`, so the transaction always drops (or is
        // committed) first; erasing the borrow lifetime cannot dangle.
        let txn: RwTxn<'static> = unsafe { std::mem::transmute(txn) };
        Ok(Self {
            txn: Some(txn),
            env: env.clone(),
        })
    }

    pub(crate) fn rw(&mut self) -> &mut RwTxn<'static> {
        self.txn.as_mut().expect("write transaction active")
    }

    pub(crate) fn ro(&self) -> &RoTxn<'static> {
        self.txn.as_ref().expect("write transaction active")
    }
}

impl Transaction for LmdbWriteTransaction {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl WriteTransaction for LmdbWriteTransaction {
    fn commit(&mut self) -> Result<(), StoreError> {
        match self.txn.take() {
            Some(txn) => txn.commit().map_err(map_err),
            None => Err(StoreError::TransactionFinished),
        }
    }

    fn renew(&mut self) -> Result<(), StoreError> {
        self.commit()?;
        let txn = self.env.write_txn().map_err(map_err)?;
        let txn: RwTxn<'static> = unsafe { std::mem::transmute(txn) };
        self.txn = Some(txn);
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_transaction(&self) -> &dyn Transaction {
        self
    }
}

/// View a generic transaction as a heed read txn. Accepts both read and
/// write transactions; panics on a foreign backend's transaction, which is
/// a caller bug.
pub(crate) fn ro_txn<'a>(txn: &'a dyn Transaction) -> &'a RoTxn<'static> {
    if let Some(read) = txn.as_any().downcast_ref::<LmdbReadTransaction>() {
        read.ro()
    } else if let Some(write) = txn.as_any().downcast_ref::<LmdbWriteTransaction>() {
        write.ro()
    } else {
        panic!("transaction from a different store backend passed to the LMDB store")
    }
}

pub(crate) fn rw_txn<'a>(txn: &'a mut dyn WriteTransaction) -> &'a mut LmdbWriteTransaction {
    txn.as_any_mut()
        .downcast_mut::<LmdbWriteTransaction>()
        .expect("write transaction from a different store backend passed to the LMDB store")
}
