//! Store assembly: environment, table handles and the `Store` impl.

use crate::environment::{open_env, LmdbConfig};
use crate::map_err;
use crate::tables::*;
use crate::transaction::{ro_txn, LmdbReadTransaction, LmdbWriteTransaction};
use heed::types::Bytes;
use heed::{CompactionOption, Database, Env};
use lattica_store::{
    AccountStore, BlockStore, ConfirmationHeightStore, FrontierStore, MetaStore,
    OnlineWeightStore, PeerStore, PendingStore, ReadTransaction, Store, StoreError, Table,
    Transaction, UncheckedStore, VoteStore, WriteTransaction, SCHEMA_VERSION,
};
use std::path::Path;

pub struct LmdbStore {
    env: Env,
    accounts: LmdbAccountStore,
    blocks: LmdbBlockStore,
    pending: LmdbPendingStore,
    frontiers: LmdbFrontierStore,
    confirmation_height: LmdbConfirmationHeightStore,
    unchecked: LmdbUncheckedStore,
    votes: LmdbVoteStore,
    online_weight: LmdbOnlineWeightStore,
    peers: LmdbPeerStore,
    meta: LmdbMetaStore,
}

impl LmdbStore {
    /// Open or create the database at `path`, creating every table and
    /// stamping the schema version. Fails if the on-disk version is newer
    /// than this build supports.
    pub fn open(path: &Path, config: &LmdbConfig) -> Result<Self, StoreError> {
        let env = open_env(path, config)?;

        let mut wtxn = env.write_txn().map_err(map_err)?;
        let mut create = |name: &str| -> Result<Database<Bytes, Bytes>, StoreError> {
            env.create_database::<Bytes, Bytes>(&mut wtxn, Some(name))
                .map_err(map_err)
        };
        let store = Self {
            accounts: LmdbAccountStore {
                db: create(Table::Accounts.name())?,
            },
            blocks: LmdbBlockStore {
                db: create(Table::Blocks.name())?,
            },
            pending: LmdbPendingStore {
                db: create(Table::Pending.name())?,
            },
            frontiers: LmdbFrontierStore {
                db: create(Table::Frontiers.name())?,
            },
            confirmation_height: LmdbConfirmationHeightStore {
                db: create(Table::ConfirmationHeight.name())?,
            },
            unchecked: LmdbUncheckedStore {
                db: create(Table::Unchecked.name())?,
            },
            votes: LmdbVoteStore {
                db: create(Table::Vote.name())?,
            },
            online_weight: LmdbOnlineWeightStore {
                db: create(Table::OnlineWeight.name())?,
            },
            peers: LmdbPeerStore {
                db: create(Table::Peers.name())?,
            },
            meta: LmdbMetaStore {
                db: create(Table::Meta.name())?,
            },
            env: env.clone(),
        };
        wtxn.commit().map_err(map_err)?;

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

        tracing::debug!(path = %path.display(), "opened lmdb store");
        Ok(store)
    }

    fn table_db(&self, table: Table) -> Database<Bytes, Bytes> {
        match table {
            Table::Frontiers => self.frontiers.db,
            Table::Accounts => self.accounts.db,
            Table::Blocks => self.blocks.db,
            Table::Pending => self.pending.db,
            Table::Unchecked => self.unchecked.db,
            Table::Vote => self.votes.db,
            Table::OnlineWeight => self.online_weight.db,
            Table::Peers => self.peers.db,
            Table::ConfirmationHeight => self.confirmation_height.db,
            Table::Meta => self.meta.db,
        }
    }
}

impl Store for LmdbStore {
    fn tx_begin_read(&self) -> Box<dyn ReadTransaction> {
        Box::new(LmdbReadTransaction::begin(&self.env).expect("begin lmdb read transaction"))
    }

    fn tx_begin_write(&self) -> Box<dyn WriteTransaction> {
        Box::new(LmdbWriteTransaction::begin(&self.env).expect("begin lmdb write transaction"))
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
        self.table_db(table).len(ro_txn(txn)).unwrap_or(0)
    }

    fn copy_db(&self, destination: &Path) -> Result<(), StoreError> {
        std::fs::create_dir_all(destination)
            .map_err(|e| StoreError::Backend(format!("create snapshot dir: {e}")))?;
        self.env
            .copy_to_file(destination.join("data.mdb"), CompactionOption::Enabled)
            .map_err(map_err)?;
        Ok(())
    }

    fn rebuild_db(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        // The frontier table is derivable from accounts; wipe and replay.
        let mut heads = Vec::new();
        self.accounts.for_each(txn.as_transaction(), &mut |account, info| {
            heads.push((info.head, *account));
            true
        });
        self.frontiers
            .db
            .clear(crate::transaction::rw_txn(txn).rw())
            .map_err(map_err)?;
        for (head, account) in heads {
            self.frontiers.put(txn, &head, &account)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_blocks::{BlockSideband, StateBlockBuilder};
    use lattica_crypto::KeyPair;
    use lattica_store::{AccountInfo, ConfirmationHeightInfo, PendingInfo, PendingKey};
    use lattica_types::{Amount, BlockDetails, BlockHash, Epoch, Link, PublicKey};

    fn open_store() -> (tempfile::TempDir, LmdbStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = LmdbConfig {
            map_size: 64 * 1024 * 1024,
            ..Default::default()
        };
        let store = LmdbStore::open(dir.path(), &config).unwrap();
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
    fn account_put_get_across_transactions() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        let info = account_info(5);

        let mut txn = store.tx_begin_write();
        store.accounts().put(&mut *txn, &account, &info).unwrap();
        // A write transaction sees its own writes.
        assert_eq!(store.accounts().get(txn.as_transaction(), &account), Some(info.clone()));
        txn.commit().unwrap();

        let read = store.tx_begin_read();
        assert_eq!(store.accounts().get(read.as_transaction(), &account), Some(info));
    }

    #[test]
    fn uncommitted_writes_are_discarded() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        {
            let mut txn = store.tx_begin_write();
            store
                .accounts()
                .put(&mut *txn, &account, &account_info(5))
                .unwrap();
            // Dropped without commit.
        }
        let read = store.tx_begin_read();
        assert!(store.accounts().get(read.as_transaction(), &account).is_none());
    }

    #[test]
    fn read_transaction_snapshots_until_refresh() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        let mut read = store.tx_begin_read();

        let mut txn = store.tx_begin_write();
        store
            .accounts()
            .put(&mut *txn, &account, &account_info(9))
            .unwrap();
        txn.commit().unwrap();

        assert!(store.accounts().get(read.as_transaction(), &account).is_none());
        read.refresh();
        assert!(store.accounts().get(read.as_transaction(), &account).is_some());
    }

    #[test]
    fn block_store_round_trip_and_successor() {
        let (_dir, store) = open_store();
        let keypair = KeyPair::from_seed([7; 32]);
        let mut block = StateBlockBuilder::new()
            .account(keypair.public)
            .previous(BlockHash::ZERO)
            .representative(keypair.public)
            .balance(Amount::raw(100))
            .link(Link::ZERO)
            .sign(&keypair)
            .build()
            .unwrap();
        block.set_sideband(BlockSideband::new(
            BlockHash::ZERO,
            keypair.public,
            Amount::raw(100),
            1,
            1_700_000_000,
            BlockDetails::new(Epoch::Epoch0, false, true, false),
            Epoch::Epoch0,
        ));

        let mut txn = store.tx_begin_write();
        store.blocks().put(&mut *txn, &block).unwrap();
        assert!(store.blocks().exists(txn.as_transaction(), &block.hash()));
        assert_eq!(store.blocks().successor(txn.as_transaction(), &block.hash()), None);

        let successor = BlockHash::new([0xAA; 32]);
        store
            .blocks()
            .successor_set(&mut *txn, &block.hash(), successor)
            .unwrap();
        assert_eq!(
            store.blocks().successor(txn.as_transaction(), &block.hash()),
            Some(successor)
        );
        txn.commit().unwrap();
    }

    #[test]
    fn pending_iteration_is_grouped_by_account() {
        let (_dir, store) = open_store();
        let dest_a = PublicKey::new([1; 32]);
        let dest_b = PublicKey::new([2; 32]);
        let info = PendingInfo::new(PublicKey::new([9; 32]), Amount::raw(4), Epoch::Epoch0);

        let mut txn = store.tx_begin_write();
        for hash in [[0x10u8; 32], [0x20; 32]] {
            store
                .pending()
                .put(
                    &mut *txn,
                    &PendingKey::new(dest_a, BlockHash::new(hash)),
                    &info,
                )
                .unwrap();
        }
        store
            .pending()
            .put(
                &mut *txn,
                &PendingKey::new(dest_b, BlockHash::new([0x01; 32])),
                &info,
            )
            .unwrap();
        txn.commit().unwrap();

        let read = store.tx_begin_read();
        let mut seen = Vec::new();
        store.pending().for_each_from(
            read.as_transaction(),
            &PendingKey::new(dest_a, BlockHash::ZERO),
            &mut |key, _| {
                if key.account != dest_a {
                    return false;
                }
                seen.push(key.hash);
                true
            },
        );
        assert_eq!(seen.len(), 2);
        assert!(seen[0] < seen[1]);
        assert!(store.pending().any(read.as_transaction(), &dest_a));
        assert!(!store
            .pending()
            .any(read.as_transaction(), &PublicKey::new([3; 32])));
    }

    #[test]
    fn counts_per_table() {
        let (_dir, store) = open_store();
        let mut txn = store.tx_begin_write();
        for byte in 1..=3u8 {
            store
                .accounts()
                .put(&mut *txn, &PublicKey::new([byte; 32]), &account_info(byte))
                .unwrap();
        }
        txn.commit().unwrap();
        let read = store.tx_begin_read();
        assert_eq!(store.count(read.as_transaction(), Table::Accounts), 3);
        assert_eq!(store.count(read.as_transaction(), Table::Blocks), 0);
    }

    #[test]
    fn vote_generate_bumps_sequence() {
        let (_dir, store) = open_store();
        let keypair = KeyPair::from_seed([5; 32]);
        let hashes = vec![BlockHash::new([1; 32])];

        let mut txn = store.tx_begin_write();
        let first = store
            .vote_generate(&mut *txn, &keypair.public, &keypair.private, hashes.clone())
            .unwrap();
        let second = store
            .vote_generate(&mut *txn, &keypair.public, &keypair.private, hashes)
            .unwrap();
        txn.commit().unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert!(second.validate());

        let read = store.tx_begin_read();
        let stored = store.votes().get(read.as_transaction(), &keypair.public).unwrap();
        assert_eq!(stored.sequence, 2);
    }

    #[test]
    fn confirmation_height_round_trip() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([4; 32]);
        let info = ConfirmationHeightInfo::new(7, BlockHash::new([8; 32]));
        let mut txn = store.tx_begin_write();
        store
            .confirmation_height()
            .put(&mut *txn, &account, &info)
            .unwrap();
        txn.commit().unwrap();
        let read = store.tx_begin_read();
        assert_eq!(
            store.confirmation_height().get(read.as_transaction(), &account),
            Some(info)
        );
    }

    #[test]
    fn rebuild_db_repopulates_frontiers() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        let info = account_info(0x42);
        let mut txn = store.tx_begin_write();
        store.accounts().put(&mut *txn, &account, &info).unwrap();
        store.rebuild_db(&mut *txn).unwrap();
        txn.commit().unwrap();

        let read = store.tx_begin_read();
        assert_eq!(
            store.frontiers().get(read.as_transaction(), &info.head),
            Some(account)
        );
    }

    #[test]
    fn copy_db_produces_openable_snapshot() {
        let (_dir, store) = open_store();
        let account = PublicKey::new([1; 32]);
        let mut txn = store.tx_begin_write();
        store
            .accounts()
            .put(&mut *txn, &account, &account_info(1))
            .unwrap();
        txn.commit().unwrap();

        let snapshot_dir = tempfile::tempdir().unwrap();
        store.copy_db(snapshot_dir.path()).unwrap();

        let config = LmdbConfig {
            map_size: 64 * 1024 * 1024,
            ..Default::default()
        };
        let copy = LmdbStore::open(snapshot_dir.path(), &config).unwrap();
        let read = copy.tx_begin_read();
        assert!(copy.accounts().get(read.as_transaction(), &account).is_some());
    }
}
