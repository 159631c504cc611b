//! Snapshot reads and batched writes.

use crate::{map_err, table_index};
use lattica_store::{ReadTransaction, StoreError, Table, Transaction, WriteTransaction};
use rocksdb::{Direction, IteratorMode, Snapshot, WriteBatch, DB};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

pub(crate) struct Shared {
    pub db: DB,
    /// Committed entry count per table, kept exact by write commits.
    pub counts: Vec<AtomicI64>,
}

impl Shared {
    pub fn cf(&self, table: Table) -> &rocksdb::ColumnFamily {
        self.db
            .cf_handle(table.name())
            .expect("column family created at open")
    }
}

// The snapshot is declared before the shared handle so it drops first;
// its erased borrow of the database never outlives the `Arc`.
pub struct RocksReadTransaction {
    snapshot: Option<Snapshot<'static>>,
    shared: Arc<Shared>,
}

impl RocksReadTransaction {
    pub(crate) fn begin(shared: Arc<Shared>) -> Self {
        let snapshot = shared.db.snapshot();
        // SAFETY: the `shared` Arc in this struct keeps the database alive
        // for as long as the snapshot, and field order guarantees the
        // snapshot is released first.
        let snapshot: Snapshot<'static> = unsafe { std::mem::transmute(snapshot) };
        Self {
            snapshot: Some(snapshot),
            shared,
        }
    }

    pub(crate) fn get(&self, table: Table, key: &[u8]) -> Option<Vec<u8>> {
        let cf = self.shared.cf(table);
        self.snapshot
            .as_ref()
            .expect("snapshot active")
            .get_cf(cf, key)
            .ok()
            .flatten()
    }

    /// Iterate key-ascending from `start`; `f` returns `false` to stop.
    pub(crate) fn scan_from(
        &self,
        table: Table,
        start: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) {
        let cf = self.shared.cf(table);
        let iter = self
            .snapshot
            .as_ref()
            .expect("snapshot active")
            .iterator_cf(cf, IteratorMode::From(start, Direction::Forward));
        for item in iter {
            let Ok((key, value)) = item else { break };
            if !f(&key, &value) {
                break;
            }
        }
    }
}

impl Transaction for RocksReadTransaction {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl ReadTransaction for RocksReadTransaction {
    fn refresh(&mut self) {
        self.snapshot = None;
        let snapshot = self.shared.db.snapshot();
        let snapshot: Snapshot<'static> = unsafe { std::mem::transmute(snapshot) };
        self.snapshot = Some(snapshot);
    }

    fn as_transaction(&self) -> &dyn Transaction {
        self
    }
}

/// Buffered write transaction: a `WriteBatch` plus a sorted overlay per
/// table so reads observe uncommitted writes. `None` in the overlay marks a
/// buffered delete.
pub struct RocksWriteTransaction {
    shared: Arc<Shared>,
    batch: WriteBatch,
    overlay: Vec<BTreeMap<Vec<u8>, Option<Vec<u8>>>>,
    /// Net entry-count change per table, applied to the shared counters on
    /// commit.
    deltas: Vec<i64>,
}

impl RocksWriteTransaction {
    pub(crate) fn begin(shared: Arc<Shared>) -> Self {
        let tables = Table::ALL.len();
        Self {
            shared,
            batch: WriteBatch::default(),
            overlay: (0..tables).map(|_| BTreeMap::new()).collect(),
            deltas: vec![0; tables],
        }
    }

    fn committed_get(&self, table: Table, key: &[u8]) -> Option<Vec<u8>> {
        let cf = self.shared.cf(table);
        self.shared.db.get_cf(cf, key).ok().flatten()
    }

    pub(crate) fn get(&self, table: Table, key: &[u8]) -> Option<Vec<u8>> {
        match self.overlay[table_index(table)].get(key) {
            Some(Some(value)) => Some(value.clone()),
            Some(None) => None,
            None => self.committed_get(table, key),
        }
    }

    pub(crate) fn put(&mut self, table: Table, key: &[u8], value: &[u8]) {
        if self.get(table, key).is_none() {
            self.deltas[table_index(table)] += 1;
        }
        let cf = self.shared.cf(table);
        self.batch.put_cf(cf, key, value);
        self.overlay[table_index(table)].insert(key.to_vec(), Some(value.to_vec()));
    }

    pub(crate) fn del(&mut self, table: Table, key: &[u8]) {
        if self.get(table, key).is_some() {
            self.deltas[table_index(table)] -= 1;
        }
        let cf = self.shared.cf(table);
        self.batch.delete_cf(cf, key);
        self.overlay[table_index(table)].insert(key.to_vec(), None);
    }

    pub(crate) fn delta(&self, table: Table) -> i64 {
        self.deltas[table_index(table)]
    }

    /// Merge-join the committed iterator with the overlay, key-ascending.
    pub(crate) fn scan_from(
        &self,
        table: Table,
        start: &[u8],
        f: &mut dyn FnMut(&[u8], &[u8]) -> bool,
    ) {
        let cf = self.shared.cf(table);
        let mut committed = self
            .shared
            .db
            .iterator_cf(cf, IteratorMode::From(start, Direction::Forward))
            .flatten()
            .peekable();
        let overlay = &self.overlay[table_index(table)];
        let mut pending = overlay.range(start.to_vec()..).peekable();

        loop {
            let take_overlay = match (committed.peek(), pending.peek()) {
                (None, None) => break,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (Some((ck, _)), Some((ok, _))) => ok.as_slice() <= ck.as_ref(),
            };
            if take_overlay {
                let (key, value) = pending.next().unwrap();
                // Skip the committed version of an overlaid key.
                if let Some((ck, _)) = committed.peek() {
                    if ck.as_ref() == key.as_slice() {
                        committed.next();
                    }
                }
                if let Some(value) = value {
                    if !f(key, value) {
                        return;
                    }
                }
                // Buffered deletes produce nothing.
            } else {
                let (key, value) = committed.next().unwrap();
                if !f(&key, &value) {
                    return;
                }
            }
        }
    }

    /// Drop every entry of `table`, honoring the overlay.
    pub(crate) fn clear(&mut self, table: Table) {
        let mut keys = Vec::new();
        self.scan_from(table, &[], &mut |key, _| {
            keys.push(key.to_vec());
            true
        });
        for key in keys {
            self.del(table, &key);
        }
    }
}

impl Transaction for RocksWriteTransaction {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl WriteTransaction for RocksWriteTransaction {
    fn commit(&mut self) -> Result<(), StoreError> {
        let batch = std::mem::take(&mut self.batch);
        self.shared.db.write(batch).map_err(map_err)?;
        for (index, delta) in self.deltas.iter_mut().enumerate() {
            if *delta != 0 {
                self.shared.counts[index].fetch_add(*delta, Ordering::SeqCst);
                *delta = 0;
            }
        }
        for overlay in &mut self.overlay {
            overlay.clear();
        }
        Ok(())
    }

    fn renew(&mut self) -> Result<(), StoreError> {
        self.commit()
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_transaction(&self) -> &dyn Transaction {
        self
    }
}

/// View a generic transaction as a RocksDB cursor source.
pub(crate) enum TxnRef<'a> {
    Read(&'a RocksReadTransaction),
    Write(&'a RocksWriteTransaction),
}

impl<'a> TxnRef<'a> {
    pub fn resolve(txn: &'a dyn Transaction) -> Self {
        if let Some(read) = txn.as_any().downcast_ref::<RocksReadTransaction>() {
            TxnRef::Read(read)
        } else if let Some(write) = txn.as_any().downcast_ref::<RocksWriteTransaction>() {
            TxnRef::Write(write)
        } else {
            panic!("transaction from a different store backend passed to the RocksDB store")
        }
    }

    pub fn get(&self, table: Table, key: &[u8]) -> Option<Vec<u8>> {
        match self {
            TxnRef::Read(txn) => txn.get(table, key),
            TxnRef::Write(txn) => txn.get(table, key),
        }
    }

    pub fn scan_from(&self, table: Table, start: &[u8], f: &mut dyn FnMut(&[u8], &[u8]) -> bool) {
        match self {
            TxnRef::Read(txn) => txn.scan_from(table, start, f),
            TxnRef::Write(txn) => txn.scan_from(table, start, f),
        }
    }
}

pub(crate) fn rw_txn<'a>(txn: &'a mut dyn WriteTransaction) -> &'a mut RocksWriteTransaction {
    txn.as_any_mut()
        .downcast_mut::<RocksWriteTransaction>()
        .expect("write transaction from a different store backend passed to the RocksDB store")
}
