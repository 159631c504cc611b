//! Per-table trait implementations.

use crate::map_err;
use crate::transaction::{ro_txn, rw_txn};
use heed::types::Bytes;
use heed::Database;
use lattica_blocks::{Block, Vote};
use lattica_store::block::{entry_bytes, entry_from_bytes};
use lattica_store::vote::{vote_bytes, vote_from_bytes};
use lattica_store::{
    AccountInfo, AccountStore, BlockStore, ConfirmationHeightInfo, ConfirmationHeightStore,
    EndpointKey, FrontierStore, MetaStore, OnlineWeightStore, PeerStore, PendingInfo, PendingKey,
    PendingStore, StoreError, Transaction, UncheckedInfo, UncheckedKey, UncheckedStore, VoteStore,
    WriteTransaction,
};
use lattica_types::{Amount, BlockHash, PublicKey};
use std::ops::Bound;
use std::sync::Arc;

type Db = Database<Bytes, Bytes>;

fn key32(bytes: &[u8]) -> Option<[u8; 32]> {
    bytes.try_into().ok()
}

// ── Accounts ─────────────────────────────────────────────────────────────

pub struct LmdbAccountStore {
    pub(crate) db: Db,
}

impl AccountStore for LmdbAccountStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        account: &PublicKey,
        info: &AccountInfo,
    ) -> Result<(), StoreError> {
        let mut value = Vec::with_capacity(AccountInfo::SIZE);
        info.serialize(&mut value);
        self.db
            .put(rw_txn(txn).rw(), account.as_bytes(), &value)
            .map_err(map_err)
    }

    fn get(&self, txn: &dyn Transaction, account: &PublicKey) -> Option<AccountInfo> {
        self.db
            .get(ro_txn(txn), account.as_bytes())
            .ok()
            .flatten()
            .and_then(AccountInfo::deserialize)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, account: &PublicKey) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), account.as_bytes())
            .map_err(map_err)
            .map(|_| ())
    }

    fn for_each(
        &self,
        txn: &dyn Transaction,
        f: &mut dyn FnMut(&PublicKey, &AccountInfo) -> bool,
    ) {
        let Ok(iter) = self.db.iter(ro_txn(txn)) else {
            return;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let (Some(raw), Some(info)) = (key32(key), AccountInfo::deserialize(value)) else {
                continue;
            };
            if !f(&PublicKey::new(raw), &info) {
                break;
            }
        }
    }

    fn for_each_from(
        &self,
        txn: &dyn Transaction,
        start: &PublicKey,
        f: &mut dyn FnMut(&PublicKey, &AccountInfo) -> bool,
    ) {
        let bounds = (
            Bound::Included(start.as_bytes().as_slice()),
            Bound::Unbounded,
        );
        let Ok(iter) = self.db.range(ro_txn(txn), &bounds) else {
            return;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let (Some(raw), Some(info)) = (key32(key), AccountInfo::deserialize(value)) else {
                continue;
            };
            if !f(&PublicKey::new(raw), &info) {
                break;
            }
        }
    }
}

// ── Blocks ───────────────────────────────────────────────────────────────

pub struct LmdbBlockStore {
    pub(crate) db: Db,
}

impl BlockStore for LmdbBlockStore {
    fn put(&self, txn: &mut dyn WriteTransaction, block: &Block) -> Result<(), StoreError> {
        let value = entry_bytes(block)?;
        self.db
            .put(rw_txn(txn).rw(), block.hash().as_bytes(), &value)
            .map_err(map_err)
    }

    fn get(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<Block> {
        self.db
            .get(ro_txn(txn), hash.as_bytes())
            .ok()
            .flatten()
            .and_then(entry_from_bytes)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, hash: &BlockHash) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), hash.as_bytes())
            .map_err(map_err)
            .map(|_| ())
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
        let Ok(iter) = self.db.iter(ro_txn(txn)) else {
            return;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let (Some(raw), Some(block)) = (key32(key), entry_from_bytes(value)) else {
                continue;
            };
            if !f(&BlockHash::new(raw), &block) {
                break;
            }
        }
    }
}

// ── Pending ──────────────────────────────────────────────────────────────

pub struct LmdbPendingStore {
    pub(crate) db: Db,
}

impl PendingStore for LmdbPendingStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        key: &PendingKey,
        info: &PendingInfo,
    ) -> Result<(), StoreError> {
        let mut value = Vec::with_capacity(PendingInfo::SIZE);
        info.serialize(&mut value);
        self.db
            .put(rw_txn(txn).rw(), &key.to_bytes(), &value)
            .map_err(map_err)
    }

    fn get(&self, txn: &dyn Transaction, key: &PendingKey) -> Option<PendingInfo> {
        self.db
            .get(ro_txn(txn), &key.to_bytes())
            .ok()
            .flatten()
            .and_then(PendingInfo::deserialize)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, key: &PendingKey) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), &key.to_bytes())
            .map_err(map_err)
            .map(|_| ())
    }

    fn for_each_from(
        &self,
        txn: &dyn Transaction,
        start: &PendingKey,
        f: &mut dyn FnMut(&PendingKey, &PendingInfo) -> bool,
    ) {
        let start_bytes = start.to_bytes();
        let bounds = (Bound::Included(start_bytes.as_slice()), Bound::Unbounded);
        let Ok(iter) = self.db.range(ro_txn(txn), &bounds) else {
            return;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let (Some(key), Some(info)) =
                (PendingKey::from_bytes(key), PendingInfo::deserialize(value))
            else {
                continue;
            };
            if !f(&key, &info) {
                break;
            }
        }
    }
}

// ── Frontiers ────────────────────────────────────────────────────────────

pub struct LmdbFrontierStore {
    pub(crate) db: Db,
}

impl FrontierStore for LmdbFrontierStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        hash: &BlockHash,
        account: &PublicKey,
    ) -> Result<(), StoreError> {
        self.db
            .put(rw_txn(txn).rw(), hash.as_bytes(), account.as_bytes())
            .map_err(map_err)
    }

    fn get(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<PublicKey> {
        self.db
            .get(ro_txn(txn), hash.as_bytes())
            .ok()
            .flatten()
            .and_then(key32)
            .map(PublicKey::new)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, hash: &BlockHash) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), hash.as_bytes())
            .map_err(map_err)
            .map(|_| ())
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&BlockHash, &PublicKey) -> bool) {
        let Ok(iter) = self.db.iter(ro_txn(txn)) else {
            return;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let (Some(hash), Some(account)) = (key32(key), key32(value)) else {
                continue;
            };
            if !f(&BlockHash::new(hash), &PublicKey::new(account)) {
                break;
            }
        }
    }
}

// ── Confirmation height ──────────────────────────────────────────────────

pub struct LmdbConfirmationHeightStore {
    pub(crate) db: Db,
}

impl ConfirmationHeightStore for LmdbConfirmationHeightStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        account: &PublicKey,
        info: &ConfirmationHeightInfo,
    ) -> Result<(), StoreError> {
        let mut value = Vec::with_capacity(ConfirmationHeightInfo::SIZE);
        info.serialize(&mut value);
        self.db
            .put(rw_txn(txn).rw(), account.as_bytes(), &value)
            .map_err(map_err)
    }

    fn get(&self, txn: &dyn Transaction, account: &PublicKey) -> Option<ConfirmationHeightInfo> {
        self.db
            .get(ro_txn(txn), account.as_bytes())
            .ok()
            .flatten()
            .and_then(ConfirmationHeightInfo::deserialize)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, account: &PublicKey) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), account.as_bytes())
            .map_err(map_err)
            .map(|_| ())
    }

    fn for_each(
        &self,
        txn: &dyn Transaction,
        f: &mut dyn FnMut(&PublicKey, &ConfirmationHeightInfo) -> bool,
    ) {
        let Ok(iter) = self.db.iter(ro_txn(txn)) else {
            return;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let (Some(raw), Some(info)) = (key32(key), ConfirmationHeightInfo::deserialize(value))
            else {
                continue;
            };
            if !f(&PublicKey::new(raw), &info) {
                break;
            }
        }
    }

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        self.db.clear(rw_txn(txn).rw()).map_err(map_err)
    }
}

// ── Unchecked ────────────────────────────────────────────────────────────

pub struct LmdbUncheckedStore {
    pub(crate) db: Db,
}

impl UncheckedStore for LmdbUncheckedStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        key: &UncheckedKey,
        info: &UncheckedInfo,
    ) -> Result<(), StoreError> {
        let mut value = Vec::new();
        info.serialize(&mut value);
        self.db
            .put(rw_txn(txn).rw(), &key.to_bytes(), &value)
            .map_err(map_err)
    }

    fn get(&self, txn: &dyn Transaction, dependency: &BlockHash) -> Vec<UncheckedInfo> {
        let mut result = Vec::new();
        let start = UncheckedKey::new(*dependency, BlockHash::ZERO).to_bytes();
        let bounds = (Bound::Included(start.as_slice()), Bound::Unbounded);
        let Ok(iter) = self.db.range(ro_txn(txn), &bounds) else {
            return result;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let Some(key) = UncheckedKey::from_bytes(key) else {
                continue;
            };
            if key.dependency != *dependency {
                break;
            }
            if let Some(info) = UncheckedInfo::deserialize(value) {
                result.push(info);
            }
        }
        result
    }

    fn del(&self, txn: &mut dyn WriteTransaction, key: &UncheckedKey) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), &key.to_bytes())
            .map_err(map_err)
            .map(|_| ())
    }

    fn exists(&self, txn: &dyn Transaction, key: &UncheckedKey) -> bool {
        self.db
            .get(ro_txn(txn), &key.to_bytes())
            .ok()
            .flatten()
            .is_some()
    }

    fn for_each(
        &self,
        txn: &dyn Transaction,
        f: &mut dyn FnMut(&UncheckedKey, &UncheckedInfo) -> bool,
    ) {
        let Ok(iter) = self.db.iter(ro_txn(txn)) else {
            return;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let (Some(key), Some(info)) = (
                UncheckedKey::from_bytes(key),
                UncheckedInfo::deserialize(value),
            ) else {
                continue;
            };
            if !f(&key, &info) {
                break;
            }
        }
    }

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        self.db.clear(rw_txn(txn).rw()).map_err(map_err)
    }
}

// ── Votes ────────────────────────────────────────────────────────────────

pub struct LmdbVoteStore {
    pub(crate) db: Db,
}

impl VoteStore for LmdbVoteStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        rep: &PublicKey,
        vote: &Vote,
    ) -> Result<(), StoreError> {
        self.db
            .put(rw_txn(txn).rw(), rep.as_bytes(), &vote_bytes(vote))
            .map_err(map_err)
    }

    fn get(&self, txn: &dyn Transaction, rep: &PublicKey) -> Option<Arc<Vote>> {
        self.db
            .get(ro_txn(txn), rep.as_bytes())
            .ok()
            .flatten()
            .and_then(|value| vote_from_bytes(rep, value))
            .map(Arc::new)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, rep: &PublicKey) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), rep.as_bytes())
            .map_err(map_err)
            .map(|_| ())
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&PublicKey, &Arc<Vote>) -> bool) {
        let Ok(iter) = self.db.iter(ro_txn(txn)) else {
            return;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let Some(raw) = key32(key) else { continue };
            let rep = PublicKey::new(raw);
            let Some(vote) = vote_from_bytes(&rep, value) else {
                continue;
            };
            if !f(&rep, &Arc::new(vote)) {
                break;
            }
        }
    }
}

// ── Online weight ────────────────────────────────────────────────────────

pub struct LmdbOnlineWeightStore {
    pub(crate) db: Db,
}

impl OnlineWeightStore for LmdbOnlineWeightStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        timestamp: u64,
        amount: &Amount,
    ) -> Result<(), StoreError> {
        self.db
            .put(
                rw_txn(txn).rw(),
                &timestamp.to_be_bytes(),
                &amount.to_be_bytes(),
            )
            .map_err(map_err)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, timestamp: u64) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), &timestamp.to_be_bytes())
            .map_err(map_err)
            .map(|_| ())
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(u64, &Amount) -> bool) {
        let Ok(iter) = self.db.iter(ro_txn(txn)) else {
            return;
        };
        for item in iter {
            let Ok((key, value)) = item else { break };
            let (Ok(ts), Ok(amount)) = (
                <[u8; 8]>::try_from(key),
                <[u8; 16]>::try_from(value),
            ) else {
                continue;
            };
            if !f(u64::from_be_bytes(ts), &Amount::from_be_bytes(amount)) {
                break;
            }
        }
    }

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        self.db.clear(rw_txn(txn).rw()).map_err(map_err)
    }
}

// ── Peers ────────────────────────────────────────────────────────────────

pub struct LmdbPeerStore {
    pub(crate) db: Db,
}

impl PeerStore for LmdbPeerStore {
    fn put(&self, txn: &mut dyn WriteTransaction, key: &EndpointKey) -> Result<(), StoreError> {
        self.db
            .put(rw_txn(txn).rw(), &key.to_bytes(), &[])
            .map_err(map_err)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, key: &EndpointKey) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), &key.to_bytes())
            .map_err(map_err)
            .map(|_| ())
    }

    fn exists(&self, txn: &dyn Transaction, key: &EndpointKey) -> bool {
        self.db
            .get(ro_txn(txn), &key.to_bytes())
            .ok()
            .flatten()
            .is_some()
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&EndpointKey) -> bool) {
        let Ok(iter) = self.db.iter(ro_txn(txn)) else {
            return;
        };
        for item in iter {
            let Ok((key, _)) = item else { break };
            let Some(key) = EndpointKey::from_bytes(key) else {
                continue;
            };
            if !f(&key) {
                break;
            }
        }
    }

    fn clear(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError> {
        self.db.clear(rw_txn(txn).rw()).map_err(map_err)
    }
}

// ── Meta ─────────────────────────────────────────────────────────────────

pub struct LmdbMetaStore {
    pub(crate) db: Db,
}

impl MetaStore for LmdbMetaStore {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        key: &[u8; 32],
        value: &[u8; 32],
    ) -> Result<(), StoreError> {
        self.db.put(rw_txn(txn).rw(), key, value).map_err(map_err)
    }

    fn get(&self, txn: &dyn Transaction, key: &[u8; 32]) -> Option<[u8; 32]> {
        self.db
            .get(ro_txn(txn), key)
            .ok()
            .flatten()
            .and_then(key32)
    }

    fn del(&self, txn: &mut dyn WriteTransaction, key: &[u8; 32]) -> Result<(), StoreError> {
        self.db
            .delete(rw_txn(txn).rw(), key)
            .map_err(map_err)
            .map(|_| ())
    }
}
