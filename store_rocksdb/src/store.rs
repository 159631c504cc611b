//! Store assembly and per-table trait implementations.

use crate::transaction::{rw_txn, RocksReadTransaction, RocksWriteTransaction, Shared, TxnRef};
use crate::{map_err, table_index};
use lattica_blocks::{Block, Vote};
use lattica_store::block::{entry_bytes, entry_from_bytes};
use lattica_store::vote::{vote_bytes, vote_from_bytes};
use lattica_store::{
    AccountInfo, AccountStore, BlockStore, ConfirmationHeightInfo, ConfirmationHeightStore,
    EndpointKey, FrontierStore, MetaStore, OnlineWeightStore, PeerStore, PendingInfo, PendingKey,
    PendingStore, ReadTransaction, Store, StoreError, Table, Transaction, UncheckedInfo,
    UncheckedKey, UncheckedStore, VoteStore, WriteTransaction, SCHEMA_VERSION,
};
use lattica_types::{Amount, BlockHash, PublicKey};
use rocksdb::{checkpoint::Checkpoint, ColumnFamilyDescriptor, IteratorMode, Options, DB};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Tuning knobs for the RocksDB database.
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
        }
    }
}

pub struct RocksDbStore {
    shared: Arc<Shared>,
    accounts: RocksAccountStore,
    blocks: RocksBlockStore,
    pending: RocksPendingStore,
    frontiers: RocksFrontierStore,
    confirmation_height: RocksConfirmationHeightStore,
    unchecked: RocksUncheckedStore,
    votes: RocksVoteStore,
    online_weight: RocksOnlineWeightStore,
    peers: RocksPeerStore,
    meta: RocksMetaStore,
}

impl RocksDbStore {
    pub fn open(path: &Path, config: &RocksDbConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(config.create_if_missing);

        let cfs: Vec<ColumnFamilyDescriptor> = Table::ALL
            .iter()
            .map(|table| ColumnFamilyDescriptor::new(table.name(), Options::default()))
            .collect();
        let db = DB::open_cf_descriptors(&opts, path, cfs).map_err(map_err)?;

        // Count each table once; commits keep the counters exact afterwards.
        let mut counts = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            let cf = db.cf_handle(table.name()).expect("column family exists");
            let count = db.iterator_cf(cf, IteratorMode::Start).count() as i64;
            counts.push(AtomicI64::new(count));
        }

        let shared = Arc::new(Shared { db, counts });
        let store = Self {
            accounts: RocksAccountStore {
                shared: Arc::clone(&shared),
            },
            blocks: RocksBlockStore {
                shared: Arc::clone(&shared),
            },
            pending: RocksPendingStore {
                shared: Arc::clone(&shared),
            },
            frontiers: RocksFrontierStore {
                shared: Arc::clone(&shared),
            },
            confirmation_height: RocksConfirmationHeightStore {
                shared: Arc::clone(&shared),
            },
            unchecked: RocksUncheckedStore {
                shared: Arc::clone(&shared),
            },
            votes: RocksVoteStore {
                shared: Arc::clone(&shared),
            },
            online_weight: RocksOnlineWeightStore {
                shared: Arc::clone(&shared),
            },
            peers: RocksPeerStore {
                shared: Arc::clone(&shared),
            },
            meta: RocksMetaStore {
                shared: Arc::clone(&shared),
            },
            shared,
        };

        let mut txn = store.tx_begin_write();
        let version = store.meta.version(txn.as_transaction());
        if version > SCHEMA_VERSION {
            return Err(StoreError::VersionMismatch {
                found: version,
                supported: SCHEMA_VERSION,
            });
        }
        store.meta.version_put(&mut *txn, SCHEMA_VERSION)?;
        txn.commit()?;

        tracing::debug!(path = %path.display(), "opened rocksdb store");
        Ok(store)
    }
}

impl Store for RocksDbStore {
    fn tx_begin_read(&self) -> Box<dyn ReadTransaction> {
        Box::new(RocksReadTransaction::begin(Arc::clone(&self.shared)))
    }

    fn tx_begin_write(&self) -> Box<dyn WriteTransaction> {
        Box::new(RocksWriteTransaction::begin(Arc::clone(&self.shared)))
    }

    fn accounts(&self) -> &dyn AccountStore {
        &self.accounts
    }

    fn blocks(&self) -> &dyn BlockStore {
        &self.blocks
    }

    fn pending(&self) -> &dyn PendingStore {
        &self.pending
    }

    fn frontiers(&self) -> &dyn FrontierStore {
        &self.frontiers
    }

    fn confirmation_height(&self) -> &dyn ConfirmationHeightStore {
        &self.confirmation_height
    }

    fn unchecked(&self) -> &dyn UncheckedStore {
        &self.unchecked
    }

    fn votes(&self) -> &dyn VoteStore {
        &self.votes
    }

    fn online_weight(&self) -> &dyn OnlineWeightStore {
        &self.online_weight
    }

    fn peers(&self) -> &dyn PeerStore {
        &self.peers
    }

    fn meta(&self) -> &dyn MetaStore {
        &self.meta
    }

    fn count(&self, txn: &dyn Transaction, table: Table) -> u64 {
        let committed = self.shared.counts[table_index(table)].load(Ordering::SeqCst);
        let delta = match TxnRef::resolve(txn) {
            TxnRef::Read(_) => 0,
            TxnRef::Write(write) => write.delta(table),
        };
        committed.saturating_add(delta).max(0) as u64
    }

    fn copy_db(&self, destination: &Path) -> Result<(), StoreError> {
        let checkpoint = Checkpoint::new(&self.shared.db).map_err(map_err)?;
        checkpoint
            .create_checkpoint(destination)
            .map_err(map_err)?;
        Ok(())
    }

    fn rebuild_db(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        let mut heads = Vec::new();
        self.accounts
            .for_each(txn.as_transaction(), &mut |account, info| {
                heads.push((info.head, *account));
                true
            });
        rw_txn(txn).clear(Table::Frontiers);
        for (head, account) in heads {
            self.frontiers.put(txn, &head, &account)?;
        }
        Ok(())
    }
}

// ── Per-table stores ─────────────────────────────────────────────────────

macro_rules! substore {
    ($name:ident) => {
        pub struct $name {
            #[allow(dead_code)]
            shared: Arc<Shared>,
        }
    };
}

substore!(RocksAccountStore);
substore!(RocksBlockStore);
substore!(RocksPendingStore);
substore!(RocksFrontierStore);
substore!(RocksConfirmationHeightStore);
substore!(RocksUncheckedStore);
substore!(RocksVoteStore);
substore!(RocksOnlineWeightStore);
substore!(RocksPeerStore);
substore!(RocksMetaStore);

fn key32(bytes: &[u8]) -> Option<[u8; 32]> {
    bytes.try_into().ok()
}

impl AccountStore for RocksAccountStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        account: &PublicKey,
        info: &AccountInfo,
    ) -> Result<(), StoreError> {
        let mut value = Vec::with_capacity(AccountInfo::SIZE);
        info.serialize(&mut value);
        rw_txn(txn).put(Table::Accounts, account.as_bytes(), &value);
        Ok(())
    }

    fn get(&self, txn: &dyn Transaction, account: &PublicKey) -> Option<AccountInfo> {
        TxnRef::resolve(txn)
            .get(Table::Accounts, account.as_bytes())
            .and_then(|value| AccountInfo::deserialize(&value))
    }

    fn del(&self, txn: &mut dyn WriteTransaction, account: &PublicKey) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::Accounts, account.as_bytes());
        Ok(())
    }

    fn for_each(
        &self,
        txn: &dyn Transaction,
        f: &mut dyn FnMut(&PublicKey, &AccountInfo) -> bool,
    ) {
        self.for_each_from(txn, &PublicKey::ZERO, f);
    }

    fn for_each_from(
        &self,
        txn: &dyn Transaction,
        start: &PublicKey,
        f: &mut dyn FnMut(&PublicKey, &AccountInfo) -> bool,
    ) {
        TxnRef::resolve(txn).scan_from(Table::Accounts, start.as_bytes(), &mut |key, value| {
            match (key32(key), AccountInfo::deserialize(value)) {
                (Some(raw), Some(info)) => f(&PublicKey::new(raw), &info),
                _ => true,
            }
        });
    }
}

impl BlockStore for RocksBlockStore {
    fn put(&self, txn: &mut dyn WriteTransaction, block: &Block) -> Result<(), StoreError> {
        let value = entry_bytes(block)?;
        rw_txn(txn).put(Table::Blocks, block.hash().as_bytes(), &value);
        Ok(())
    }

    fn get(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<Block> {
        TxnRef::resolve(txn)
            .get(Table::Blocks, hash.as_bytes())
            .and_then(|value| entry_from_bytes(&value))
    }

    fn del(&self, txn: &mut dyn WriteTransaction, hash: &BlockHash) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::Blocks, hash.as_bytes());
        Ok(())
    }

    fn successor_set(
        &self,
        txn: &mut dyn WriteTransaction,
        hash: &BlockHash,
        successor: BlockHash,
    ) -> Result<(), StoreError> {
        let mut block = self
            .get(txn.as_transaction(), hash)
            .ok_or(StoreError::NotFound)?;
        let mut sideband = block.sideband().cloned().ok_or(StoreError::NotFound)?;
        sideband.successor = successor;
        block.set_sideband(sideband);
        self.put(txn, &block)
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&BlockHash, &Block) -> bool) {
        TxnRef::resolve(txn).scan_from(Table::Blocks, &[], &mut |key, value| {
            match (key32(key), entry_from_bytes(value)) {
                (Some(raw), Some(block)) => f(&BlockHash::new(raw), &block),
                _ => true,
            }
        });
    }
}

impl PendingStore for RocksPendingStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        key: &PendingKey,
        info: &PendingInfo,
    ) -> Result<(), StoreError> {
        let mut value = Vec::with_capacity(PendingInfo::SIZE);
        info.serialize(&mut value);
        rw_txn(txn).put(Table::Pending, &key.to_bytes(), &value);
        Ok(())
    }

    fn get(&self, txn: &dyn Transaction, key: &PendingKey) -> Option<PendingInfo> {
        TxnRef::resolve(txn)
            .get(Table::Pending, &key.to_bytes())
            .and_then(|value| PendingInfo::deserialize(&value))
    }

    fn del(&self, txn: &mut dyn WriteTransaction, key: &PendingKey) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::Pending, &key.to_bytes());
        Ok(())
    }

    fn for_each_from(
        &self,
        txn: &dyn Transaction,
        start: &PendingKey,
        f: &mut dyn FnMut(&PendingKey, &PendingInfo) -> bool,
    ) {
        TxnRef::resolve(txn).scan_from(Table::Pending, &start.to_bytes(), &mut |key, value| {
            match (PendingKey::from_bytes(key), PendingInfo::deserialize(value)) {
                (Some(key), Some(info)) => f(&key, &info),
                _ => true,
            }
        });
    }
}

impl FrontierStore for RocksFrontierStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        hash: &BlockHash,
        account: &PublicKey,
    ) -> Result<(), StoreError> {
        rw_txn(txn).put(Table::Frontiers, hash.as_bytes(), account.as_bytes());
        Ok(())
    }

    fn get(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<PublicKey> {
        TxnRef::resolve(txn)
            .get(Table::Frontiers, hash.as_bytes())
            .and_then(|value| key32(&value))
            .map(PublicKey::new)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, hash: &BlockHash) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::Frontiers, hash.as_bytes());
        Ok(())
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&BlockHash, &PublicKey) -> bool) {
        TxnRef::resolve(txn).scan_from(Table::Frontiers, &[], &mut |key, value| {
            match (key32(key), key32(value)) {
                (Some(hash), Some(account)) => f(&BlockHash::new(hash), &PublicKey::new(account)),
                _ => true,
            }
        });
    }
}

impl ConfirmationHeightStore for RocksConfirmationHeightStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        account: &PublicKey,
        info: &ConfirmationHeightInfo,
    ) -> Result<(), StoreError> {
        let mut value = Vec::with_capacity(ConfirmationHeightInfo::SIZE);
        info.serialize(&mut value);
        rw_txn(txn).put(Table::ConfirmationHeight, account.as_bytes(), &value);
        Ok(())
    }

    fn get(&self, txn: &dyn Transaction, account: &PublicKey) -> Option<ConfirmationHeightInfo> {
        TxnRef::resolve(txn)
            .get(Table::ConfirmationHeight, account.as_bytes())
            .and_then(|value| ConfirmationHeightInfo::deserialize(&value))
    }

    fn del(&self, txn: &mut dyn WriteTransaction, account: &PublicKey) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::ConfirmationHeight, account.as_bytes());
        Ok(())
    }

    fn for_each(
        &self,
        txn: &dyn Transaction,
        f: &mut dyn FnMut(&PublicKey, &ConfirmationHeightInfo) -> bool,
    ) {
        TxnRef::resolve(txn).scan_from(Table::ConfirmationHeight, &[], &mut |key, value| {
            match (key32(key), ConfirmationHeightInfo::deserialize(value)) {
                (Some(raw), Some(info)) => f(&PublicKey::new(raw), &info),
                _ => true,
            }
        });
    }

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        rw_txn(txn).clear(Table::ConfirmationHeight);
        Ok(())
    }
}

impl UncheckedStore for RocksUncheckedStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        key: &UncheckedKey,
        info: &UncheckedInfo,
    ) -> Result<(), StoreError> {
        let mut value = Vec::new();
        info.serialize(&mut value);
        rw_txn(txn).put(Table::Unchecked, &key.to_bytes(), &value);
        Ok(())
    }

    fn get(&self, txn: &dyn Transaction, dependency: &BlockHash) -> Vec<UncheckedInfo> {
        let mut result = Vec::new();
        let start = UncheckedKey::new(*dependency, BlockHash::ZERO).to_bytes();
        TxnRef::resolve(txn).scan_from(Table::Unchecked, &start, &mut |key, value| {
            let Some(key) = UncheckedKey::from_bytes(key) else {
                return true;
            };
            if key.dependency != *dependency {
                return false;
            }
            if let Some(info) = UncheckedInfo::deserialize(value) {
                result.push(info);
            }
            true
        });
        result
    }

    fn del(&self, txn: &mut dyn WriteTransaction, key: &UncheckedKey) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::Unchecked, &key.to_bytes());
        Ok(())
    }

    fn exists(&self, txn: &dyn Transaction, key: &UncheckedKey) -> bool {
        TxnRef::resolve(txn)
            .get(Table::Unchecked, &key.to_bytes())
            .is_some()
    }

    fn for_each(
        &self,
        txn: &dyn Transaction,
        f: &mut dyn FnMut(&UncheckedKey, &UncheckedInfo) -> bool,
    ) {
        TxnRef::resolve(txn).scan_from(Table::Unchecked, &[], &mut |key, value| {
            match (
                UncheckedKey::from_bytes(key),
                UncheckedInfo::deserialize(value),
            ) {
                (Some(key), Some(info)) => f(&key, &info),
                _ => true,
            }
        });
    }

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        rw_txn(txn).clear(Table::Unchecked);
        Ok(())
    }
}

impl VoteStore for RocksVoteStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        rep: &PublicKey,
        vote: &Vote,
    ) -> Result<(), StoreError> {
        rw_txn(txn).put(Table::Vote, rep.as_bytes(), &vote_bytes(vote));
        Ok(())
    }

    fn get(&self, txn: &dyn Transaction, rep: &PublicKey) -> Option<Arc<Vote>> {
        TxnRef::resolve(txn)
            .get(Table::Vote, rep.as_bytes())
            .and_then(|value| vote_from_bytes(rep, &value))
            .map(Arc::new)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, rep: &PublicKey) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::Vote, rep.as_bytes());
        Ok(())
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&PublicKey, &Arc<Vote>) -> bool) {
        TxnRef::resolve(txn).scan_from(Table::Vote, &[], &mut |key, value| {
            let Some(raw) = key32(key) else { return true };
            let rep = PublicKey::new(raw);
            match vote_from_bytes(&rep, value) {
                Some(vote) => f(&rep, &Arc::new(vote)),
                None => true,
            }
        });
    }
}

impl OnlineWeightStore for RocksOnlineWeightStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        timestamp: u64,
        amount: &Amount,
    ) -> Result<(), StoreError> {
        rw_txn(txn).put(
            Table::OnlineWeight,
            &timestamp.to_be_bytes(),
            &amount.to_be_bytes(),
        );
        Ok(())
    }

    fn del(&self, txn: &mut dyn WriteTransaction, timestamp: u64) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::OnlineWeight, &timestamp.to_be_bytes());
        Ok(())
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(u64, &Amount) -> bool) {
        TxnRef::resolve(txn).scan_from(Table::OnlineWeight, &[], &mut |key, value| {
            match (<[u8; 8]>::try_from(key), <[u8; 16]>::try_from(value)) {
                (Ok(ts), Ok(amount)) => {
                    f(u64::from_be_bytes(ts), &Amount::from_be_bytes(amount))
                }
                _ => true,
            }
        });
    }

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        rw_txn(txn).clear(Table::OnlineWeight);
        Ok(())
    }
}

impl PeerStore for RocksPeerStore {
    fn put(&self, txn: &mut dyn WriteTransaction, key: &EndpointKey) -> Result<(), StoreError> {
        rw_txn(txn).put(Table::Peers, &key.to_bytes(), &[]);
        Ok(())
    }

    fn del(&self, txn: &mut dyn WriteTransaction, key: &EndpointKey) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::Peers, &key.to_bytes());
        Ok(())
    }

    fn exists(&self, txn: &dyn Transaction, key: &EndpointKey) -> bool {
        TxnRef::resolve(txn)
            .get(Table::Peers, &key.to_bytes())
            .is_some()
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&EndpointKey) -> bool) {
        TxnRef::resolve(txn).scan_from(Table::Peers, &[], &mut |key, _| {
            match EndpointKey::from_bytes(key) {
                Some(key) => f(&key),
                None => true,
            }
        });
    }

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        rw_txn(txn).clear(Table::Peers);
        Ok(())
    }
}

impl MetaStore for RocksMetaStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        key: &[u8; 32],
        value: &[u8; 32],
    ) -> Result<(), StoreError> {
        rw_txn(txn).put(Table::Meta, key, value);
        Ok(())
    }

    fn get(&self, txn: &dyn Transaction, key: &[u8; 32]) -> Option<[u8; 32]> {
        TxnRef::resolve(txn)
            .get(Table::Meta, key)
            .and_then(|value| key32(&value))
    }

    fn del(&self, txn: &mut dyn WriteTransaction, key: &[u8; 32]) -> Result<(), StoreError> {
        rw_txn(txn).del(Table::Meta, key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_types::Epoch;

    fn open_store() -> (tempfile::TempDir, RocksDbStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksDbStore::open(dir.path(), &RocksDbConfig::default()).unwrap();
        (dir, store)
    }

    fn account_info(head: u8) -> AccountInfo {
        AccountInfo {
            head: BlockHash::new([head; 32]),
            representative: PublicKey::new([2; 32]),
            open_block: BlockHash::new([3; 32]),
            balance: Amount::raw(head as u128),
            modified: 1_700_000_000,
            block_count: head as u64,
            epoch: Epoch::Epoch0,
        }
    }

    #[test]
    fn write_transaction_sees_own_writes() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        let mut txn = store.tx_begin_write();
        store
            .accounts()
            .put(&mut *txn, &account, &account_info(5))
            .unwrap();
        assert!(store.accounts().get(txn.as_transaction(), &account).is_some());
        // Count includes the buffered write.
        assert_eq!(store.count(txn.as_transaction(), Table::Accounts), 1);
        txn.commit().unwrap();

        let read = store.tx_begin_read();
        assert_eq!(store.count(read.as_transaction(), Table::Accounts), 1);
    }

    #[test]
    fn dropped_transaction_discards_writes() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        {
            let mut txn = store.tx_begin_write();
            store
                .accounts()
                .put(&mut *txn, &account, &account_info(5))
                .unwrap();
        }
        let read = store.tx_begin_read();
        assert!(store.accounts().get(read.as_transaction(), &account).is_none());
        assert_eq!(store.count(read.as_transaction(), Table::Accounts), 0);
    }

    #[test]
    fn snapshot_isolation_for_readers() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        let mut read = store.tx_begin_read();

        let mut txn = store.tx_begin_write();
        store
            .accounts()
            .put(&mut *txn, &account, &account_info(1))
            .unwrap();
        txn.commit().unwrap();

        assert!(store.accounts().get(read.as_transaction(), &account).is_none());
        read.refresh();
        assert!(store.accounts().get(read.as_transaction(), &account).is_some());
    }

    #[test]
    fn buffered_delete_hides_committed_entry() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        let mut txn = store.tx_begin_write();
        store
            .accounts()
            .put(&mut *txn, &account, &account_info(1))
            .unwrap();
        txn.commit().unwrap();

        let mut txn = store.tx_begin_write();
        store.accounts().del(&mut *txn, &account).unwrap();
        assert!(store.accounts().get(txn.as_transaction(), &account).is_none());
        let mut visited = 0;
        store.accounts().for_each(txn.as_transaction(), &mut |_, _| {
            visited += 1;
            true
        });
        assert_eq!(visited, 0);
        txn.commit().unwrap();

        let read = store.tx_begin_read();
        assert_eq!(store.count(read.as_transaction(), Table::Accounts), 0);
    }

    #[test]
    fn merged_iteration_orders_overlay_and_committed() {
        let (_dir, store) = open_store();
        let mut txn = store.tx_begin_write();
        store
            .accounts()
            .put(&mut *txn, &PublicKey::new([2; 32]), &account_info(2))
            .unwrap();
        txn.commit().unwrap();

        let mut txn = store.tx_begin_write();
        store
            .accounts()
            .put(&mut *txn, &PublicKey::new([1; 32]), &account_info(1))
            .unwrap();
        store
            .accounts()
            .put(&mut *txn, &PublicKey::new([3; 32]), &account_info(3))
            .unwrap();

        let mut order = Vec::new();
        store.accounts().for_each(txn.as_transaction(), &mut |key, _| {
            order.push(key.as_bytes()[0]);
            true
        });
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn counts_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksDbStore::open(dir.path(), &RocksDbConfig::default()).unwrap();
            let mut txn = store.tx_begin_write();
            for byte in 1..=4u8 {
                store
                    .accounts()
                    .put(&mut *txn, &PublicKey::new([byte; 32]), &account_info(byte))
                    .unwrap();
            }
            txn.commit().unwrap();
        }
        let store = RocksDbStore::open(dir.path(), &RocksDbConfig::default()).unwrap();
        let read = store.tx_begin_read();
        assert_eq!(store.count(read.as_transaction(), Table::Accounts), 4);
    }

    #[test]
    fn checkpoint_copy_is_openable() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        let mut txn = store.tx_begin_write();
        store
            .accounts()
            .put(&mut *txn, &account, &account_info(1))
            .unwrap();
        txn.commit().unwrap();

        let parent = tempfile::tempdir().unwrap();
        let destination = parent.path().join("snapshot");
        store.copy_db(&destination).unwrap();

        let copy = RocksDbStore::open(&destination, &RocksDbConfig::default()).unwrap();
        let read = copy.tx_begin_read();
        assert!(copy.accounts().get(read.as_transaction(), &account).is_some());
    }
}
