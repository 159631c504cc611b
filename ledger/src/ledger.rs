//! Block validation and application.
//!
//! `process` is the single gate through which every block enters the
//! ledger: it validates signature, position, balance arithmetic, epoch
//! transition and proof-of-work, then applies the block and its side
//! effects (pending entries, representative weights, successor pointers)
//! inside the caller's write transaction.

use crate::genesis::Genesis;
use crate::rep_weights::RepWeights;
use lattica_blocks::{Block, BlockSideband};
use lattica_crypto::verify_message;
use lattica_store::{
    AccountInfo, ConfirmationHeightInfo, PendingInfo, PendingKey, ReadTransaction, Store,
    StoreError, Table, Transaction, WriteTransaction,
};
use lattica_store::unchecked::SignatureVerification;
use lattica_types::{
    Amount, BlockDetails, BlockHash, Epoch, Epochs, Link, NetworkParams, PublicKey, Root,
    BURN_ACCOUNT,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// One code per failure mode; `Progress` is the only success.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessResult {
    Progress,
    BadSignature,
    Old,
    NegativeSpend,
    Fork,
    Unreceivable,
    GapPrevious,
    GapSource,
    OpenedBurnAccount,
    BalanceMismatch,
    RepresentativeMismatch,
    BlockPosition,
    InsufficientWork,
}

/// Everything a caller learns from processing one block.
#[derive(Clone, Debug)]
pub struct ProcessReturn {
    pub code: ProcessResult,
    pub account: PublicKey,
    /// Funds moved by the block; zero for change and epoch blocks.
    pub amount: Amount,
    /// Destination of a send; zero otherwise.
    pub pending_account: PublicKey,
    pub is_send: bool,
    pub verified: SignatureVerification,
    pub previous_balance: Amount,
}

impl ProcessReturn {
    fn failed(code: ProcessResult) -> Self {
        Self {
            code,
            account: PublicKey::ZERO,
            amount: Amount::ZERO,
            pending_account: PublicKey::ZERO,
            is_send: false,
            verified: SignatureVerification::Unknown,
            previous_balance: Amount::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RollbackError {
    #[error("block not found")]
    NotFound,
    #[error("cannot roll back a cemented block")]
    Cemented,
    #[error("ledger corruption during rollback: {0}")]
    Corrupt(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Hot counters mirrored from the store.
#[derive(Default)]
pub struct LedgerCache {
    pub block_count: AtomicU64,
    pub account_count: AtomicU64,
    pub cemented_count: AtomicU64,
}

pub struct Ledger {
    pub store: Arc<dyn Store>,
    pub rep_weights: RepWeights,
    pub params: NetworkParams,
    pub cache: LedgerCache,
    genesis_hash: BlockHash,
    genesis_account: PublicKey,
}

fn seconds_since_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Ledger {
    /// Open the ledger over `store`, writing the genesis block if the store
    /// is empty, then rebuilding weights and cached counters.
    pub fn new(
        store: Arc<dyn Store>,
        params: NetworkParams,
        genesis: &Genesis,
    ) -> Result<Self, StoreError> {
        let ledger = Self {
            store,
            rep_weights: RepWeights::new(),
            params,
            cache: LedgerCache::default(),
            genesis_hash: genesis.hash(),
            genesis_account: genesis.account,
        };

        {
            let mut txn = ledger.store.tx_begin_write();
            if ledger.store.count(txn.as_transaction(), Table::Blocks) == 0 {
                ledger.initialize(&mut *txn, genesis)?;
            }
            txn.commit()?;
        }

        let txn = ledger.store.tx_begin_read();
        let mut account_count = 0u64;
        ledger
            .store
            .accounts()
            .for_each(txn.as_transaction(), &mut |_, info| {
                ledger
                    .rep_weights
                    .representation_add(info.representative, info.balance);
                account_count += 1;
                true
            });
        let mut cemented = 0u64;
        ledger
            .store
            .confirmation_height()
            .for_each(txn.as_transaction(), &mut |_, info| {
                cemented += info.height;
                true
            });
        ledger.cache.account_count.store(account_count, Ordering::Relaxed);
        ledger.cache.cemented_count.store(cemented, Ordering::Relaxed);
        ledger.cache.block_count.store(
            ledger.store.count(txn.as_transaction(), Table::Blocks),
            Ordering::Relaxed,
        );
        Ok(ledger)
    }

    fn initialize(
        &self,
        txn: &mut dyn WriteTransaction,
        genesis: &Genesis,
    ) -> Result<(), StoreError> {
        let mut block = genesis.block.clone();
        block.set_sideband(BlockSideband::new(
            BlockHash::ZERO,
            genesis.account,
            Amount::MAX,
            1,
            seconds_since_epoch(),
            BlockDetails::new(Epoch::Epoch0, false, false, false),
            Epoch::Epoch0,
        ));
        self.store.blocks().put(txn, &block)?;
        self.store.accounts().put(
            txn,
            &genesis.account,
            &AccountInfo {
                head: genesis.hash(),
                representative: genesis.account,
                open_block: genesis.hash(),
                balance: Amount::MAX,
                modified: seconds_since_epoch(),
                block_count: 1,
                epoch: Epoch::Epoch0,
            },
        )?;
        // Genesis is born confirmed.
        self.store.confirmation_height().put(
            txn,
            &genesis.account,
            &ConfirmationHeightInfo::new(1, genesis.hash()),
        )?;
        tracing::info!(hash = %genesis.hash(), "initialized ledger with genesis");
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis_hash
    }

    pub fn genesis_account(&self) -> PublicKey {
        self.genesis_account
    }

    pub fn block_exists(&self, txn: &dyn Transaction, hash: &BlockHash) -> bool {
        self.store.blocks().exists(txn, hash)
    }

    pub fn block_get(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<Block> {
        self.store.blocks().get(txn, hash)
    }

    /// Balance of the account as of `hash`.
    pub fn balance(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<Amount> {
        self.store
            .blocks()
            .get(txn, hash)
            .and_then(|block| block.sideband().map(|s| s.balance))
    }

    /// The account owning `hash`.
    pub fn account(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<PublicKey> {
        self.store.blocks().account_computed(txn, hash)
    }

    /// Funds moved by the block at `hash`.
    pub fn amount(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<Amount> {
        let block = self.store.blocks().get(txn, hash)?;
        let balance = block.sideband()?.balance;
        let previous = block.previous();
        if previous.is_zero() {
            return Some(balance);
        }
        let previous_balance = self.balance(txn, &previous)?;
        Some(if balance > previous_balance {
            balance - previous_balance
        } else {
            previous_balance - balance
        })
    }

    pub fn latest(&self, txn: &dyn Transaction, account: &PublicKey) -> Option<BlockHash> {
        self.store.accounts().get(txn, account).map(|info| info.head)
    }

    pub fn weight(&self, rep: &PublicKey) -> Amount {
        self.rep_weights.representation_get(rep)
    }

    pub fn is_epoch_link(&self, link: &Link) -> bool {
        self.params.epochs.is_epoch_link(link)
    }

    /// Whether the block at `hash` is covered by its account's cemented
    /// frontier.
    pub fn block_confirmed(&self, txn: &dyn Transaction, hash: &BlockHash) -> bool {
        let Some(block) = self.store.blocks().get(txn, hash) else {
            return false;
        };
        let Some(sideband) = block.sideband() else {
            return false;
        };
        self.store
            .confirmation_height()
            .get(txn, &sideband.account)
            .map(|info| info.height >= sideband.height)
            .unwrap_or(false)
    }

    /// Whether every dependency of `block` (previous, and source for
    /// receives) is already confirmed.
    pub fn dependents_confirmed(&self, txn: &dyn Transaction, block: &Block) -> bool {
        let mut dependencies = Vec::new();
        let previous = block.previous();
        if !previous.is_zero() {
            dependencies.push(previous);
        }
        if let Some(source) = self.receive_source(txn, block) {
            dependencies.push(source);
        }
        dependencies
            .iter()
            .all(|hash| self.block_confirmed(txn, hash))
    }

    /// The source hash a receive-shaped block consumes, if any.
    pub fn receive_source(&self, txn: &dyn Transaction, block: &Block) -> Option<BlockHash> {
        match block {
            Block::Receive(_) | Block::Open(_) => block.source(),
            Block::State(state) => {
                let is_receive = block
                    .sideband()
                    .map(|s| s.details.is_receive)
                    .unwrap_or_else(|| {
                        // Not yet in the ledger: infer from balances.
                        !state.link.is_zero()
                            && !self.is_epoch_link(&state.link)
                            && self
                                .balance(txn, &state.previous)
                                .map(|prev| state.balance > prev)
                                .unwrap_or(state.previous.is_zero())
                    });
                is_receive.then(|| BlockHash::from(state.link))
            }
            _ => None,
        }
    }

    /// The block that follows `root`: the successor of a block hash, or the
    /// open block of an account.
    pub fn successor_by_root(&self, txn: &dyn Transaction, root: &Root) -> Option<Block> {
        let as_hash = BlockHash::from(*root);
        if let Some(successor) = self.store.blocks().successor(txn, &as_hash) {
            return self.store.blocks().get(txn, &successor);
        }
        if self.store.blocks().exists(txn, &as_hash) {
            return None; // frontier block, nothing follows yet
        }
        let account = PublicKey::new(*root.as_bytes());
        let info = self.store.accounts().get(txn, &account)?;
        self.store.blocks().get(txn, &info.open_block)
    }

    /// Walk back from `hash` to the nearest block carrying a representative.
    fn representative_calculated(&self, txn: &dyn Transaction, hash: &BlockHash) -> PublicKey {
        let mut current = *hash;
        loop {
            let Some(block) = self.store.blocks().get(txn, &current) else {
                return PublicKey::ZERO;
            };
            if let Some(rep) = block.representative() {
                return rep;
            }
            current = block.previous();
            if current.is_zero() {
                return PublicKey::ZERO;
            }
        }
    }

    // ── Processing ───────────────────────────────────────────────────────

    /// Validate and apply `block`. On `Progress` the block has been written
    /// with its sideband and all side effects inside `txn`.
    pub fn process(&self, txn: &mut dyn WriteTransaction, block: &mut Block) -> ProcessReturn {
        let result = match block {
            Block::State(_) => self.process_state(txn, block),
            Block::Send(_) => self.process_send(txn, block),
            Block::Receive(_) => self.process_receive(txn, block),
            Block::Open(_) => self.process_open(txn, block),
            Block::Change(_) => self.process_change(txn, block),
        };
        if result.code == ProcessResult::Progress {
            self.cache.block_count.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn process_state(&self, txn: &mut dyn WriteTransaction, block: &mut Block) -> ProcessReturn {
        let hash = block.hash();
        if self.block_exists(txn.as_transaction(), &hash) {
            return ProcessReturn::failed(ProcessResult::Old);
        }

        let Block::State(state) = &*block else { unreachable!() };
        let account = state.account;
        let previous = state.previous;
        let balance = state.balance;
        let representative = state.representative;
        let link = state.link;
        let signature = state.signature;
        let work = state.work;

        let is_epoch = self.is_epoch_link(&link);
        let mut verified = SignatureVerification::Valid;
        if is_epoch {
            let epoch = self.params.epochs.epoch(&link).expect("epoch link resolves");
            let signer = self.params.epochs.signer(epoch).unwrap_or(account);
            if !verify_message(hash.as_bytes(), &signature, &signer) {
                return ProcessReturn::failed(ProcessResult::BadSignature);
            }
            verified = SignatureVerification::ValidEpoch;
        } else if !verify_message(hash.as_bytes(), &signature, &account) {
            return ProcessReturn::failed(ProcessResult::BadSignature);
        }

        let info = self.store.accounts().get(txn.as_transaction(), &account);
        if !previous.is_zero() {
            if !self.block_exists(txn.as_transaction(), &previous) {
                return ProcessReturn::failed(ProcessResult::GapPrevious);
            }
            match &info {
                None => return ProcessReturn::failed(ProcessResult::GapPrevious),
                Some(info) if info.head != previous => {
                    return ProcessReturn::failed(ProcessResult::Fork)
                }
                Some(_) => {}
            }
        } else if info.is_some() {
            // Re-opening an existing account contends for the open slot.
            return ProcessReturn::failed(ProcessResult::Fork);
        }

        if is_epoch {
            return self.process_state_epoch(txn, block, &info, verified);
        }

        let previous_balance = info.as_ref().map(|i| i.balance).unwrap_or(Amount::ZERO);
        let account_epoch = info.as_ref().map(|i| i.epoch).unwrap_or(Epoch::Epoch0);

        let mut is_send = false;
        let mut is_receive = false;
        let mut amount = Amount::ZERO;
        let mut pending_account = PublicKey::ZERO;
        let mut new_epoch = account_epoch;
        let mut source_epoch = Epoch::Invalid;

        if balance < previous_balance {
            is_send = true;
            amount = previous_balance - balance;
            pending_account = PublicKey::from(link);
        } else if !link.is_zero() {
            // Receiving: link is the source send.
            is_receive = true;
            if info.is_none() && account == BURN_ACCOUNT {
                return ProcessReturn::failed(ProcessResult::OpenedBurnAccount);
            }
            let source = BlockHash::from(link);
            if !self.block_exists(txn.as_transaction(), &source) {
                return ProcessReturn::failed(ProcessResult::GapSource);
            }
            let key = PendingKey::new(account, source);
            let Some(pending) = self.store.pending().get(txn.as_transaction(), &key) else {
                return ProcessReturn::failed(ProcessResult::Unreceivable);
            };
            let expected = previous_balance.checked_add(pending.amount);
            if expected != Some(balance) {
                return ProcessReturn::failed(ProcessResult::BalanceMismatch);
            }
            amount = pending.amount;
            source_epoch = pending.epoch;
            new_epoch = account_epoch.max(pending.epoch);
        } else {
            // Neither send nor receive: a representative change. Balance
            // must carry over exactly; anything else would mint or burn.
            if balance != previous_balance {
                return ProcessReturn::failed(ProcessResult::BalanceMismatch);
            }
            if info.is_none() {
                // Opening with no source and no balance has no meaning.
                return ProcessReturn::failed(ProcessResult::GapSource);
            }
        }

        let details = BlockDetails::new(new_epoch, is_send, is_receive, false);
        if lattica_work::difficulty::value(&block.root(), work)
            < self.params.work.threshold(&details)
        {
            return ProcessReturn::failed(ProcessResult::InsufficientWork);
        }

        let height = info.as_ref().map(|i| i.block_count).unwrap_or(0) + 1;
        block.set_sideband(BlockSideband::new(
            BlockHash::ZERO,
            account,
            balance,
            height,
            seconds_since_epoch(),
            details,
            source_epoch,
        ));
        if let Err(error) = self.apply(
            txn,
            block,
            &info,
            AccountInfo {
                head: hash,
                representative,
                open_block: info.as_ref().map(|i| i.open_block).unwrap_or(hash),
                balance,
                modified: seconds_since_epoch(),
                block_count: height,
                epoch: new_epoch,
            },
        ) {
            tracing::error!(%hash, %error, "state block application failed");
            return ProcessReturn::failed(ProcessResult::Old);
        }

        // Pending side effects after the block itself is in place.
        let pending_result = if is_send {
            self.store.pending().put(
                txn,
                &PendingKey::new(pending_account, hash),
                &PendingInfo::new(account, amount, new_epoch),
            )
        } else if is_receive {
            self.store
                .pending()
                .del(txn, &PendingKey::new(account, BlockHash::from(link)))
        } else {
            Ok(())
        };
        if let Err(error) = pending_result {
            tracing::error!(%hash, %error, "pending update failed");
        }

        ProcessReturn {
            code: ProcessResult::Progress,
            account,
            amount,
            pending_account,
            is_send,
            verified,
            previous_balance,
        }
    }

    fn process_state_epoch(
        &self,
        txn: &mut dyn WriteTransaction,
        block: &mut Block,
        info: &Option<AccountInfo>,
        verified: SignatureVerification,
    ) -> ProcessReturn {
        let Block::State(state) = &*block else { unreachable!() };
        let hash = block.hash();
        let account = state.account;

        let Some(info) = info else {
            // Epoch blocks upgrade existing accounts only.
            return ProcessReturn::failed(ProcessResult::GapPrevious);
        };
        if state.balance != info.balance {
            return ProcessReturn::failed(ProcessResult::BalanceMismatch);
        }
        if state.representative != info.representative {
            return ProcessReturn::failed(ProcessResult::RepresentativeMismatch);
        }
        let target = self
            .params
            .epochs
            .epoch(&state.link)
            .expect("epoch link resolves");
        if !Epochs::is_sequential(info.epoch, target) {
            return ProcessReturn::failed(ProcessResult::BlockPosition);
        }

        let details = BlockDetails::new(target, false, false, true);
        if lattica_work::difficulty::value(&block.root(), state.work)
            < self.params.work.threshold(&details)
        {
            return ProcessReturn::failed(ProcessResult::InsufficientWork);
        }

        let previous_balance = info.balance;
        let height = info.block_count + 1;
        block.set_sideband(BlockSideband::new(
            BlockHash::ZERO,
            account,
            previous_balance,
            height,
            seconds_since_epoch(),
            details,
            Epoch::Invalid,
        ));
        let new_info = AccountInfo {
            head: hash,
            representative: info.representative,
            open_block: info.open_block,
            balance: previous_balance,
            modified: seconds_since_epoch(),
            block_count: height,
            epoch: target,
        };
        if let Err(error) = self.apply(txn, block, &Some(info.clone()), new_info) {
            tracing::error!(%hash, %error, "epoch block application failed");
            return ProcessReturn::failed(ProcessResult::Old);
        }

        ProcessReturn {
            code: ProcessResult::Progress,
            account,
            amount: Amount::ZERO,
            pending_account: PublicKey::ZERO,
            is_send: false,
            verified,
            previous_balance,
        }
    }

    /// Common application path: store block, fix successor pointer, move
    /// representative weight, update the account entry.
    fn apply(
        &self,
        txn: &mut dyn WriteTransaction,
        block: &Block,
        old_info: &Option<AccountInfo>,
        new_info: AccountInfo,
    ) -> Result<(), StoreError> {
        self.store.blocks().put(txn, block)?;
        let previous = block.previous();
        if !previous.is_zero() {
            self.store.blocks().successor_set(txn, &previous, block.hash())?;
        }
        if let Some(old) = old_info {
            self.rep_weights
                .representation_subtract(old.representative, old.balance);
        } else {
            self.cache.account_count.fetch_add(1, Ordering::Relaxed);
        }
        self.rep_weights
            .representation_add(new_info.representative, new_info.balance);
        let account = block
            .sideband()
            .map(|s| s.account)
            .expect("sideband attached before apply");
        self.store.accounts().put(txn, &account, &new_info)
    }

    fn process_send(&self, txn: &mut dyn WriteTransaction, block: &mut Block) -> ProcessReturn {
        let hash = block.hash();
        if self.block_exists(txn.as_transaction(), &hash) {
            return ProcessReturn::failed(ProcessResult::Old);
        }
        let Block::Send(send) = &*block else { unreachable!() };
        let previous = send.previous;
        let destination = send.destination;
        let balance = send.balance;
        let signature = send.signature;
        let work = send.work;

        let Some(legacy) = self.legacy_preamble(txn.as_transaction(), block, &previous, &signature)
        else {
            return ProcessReturn::failed(ProcessResult::GapPrevious);
        };
        let (account, info) = match legacy {
            Ok(pair) => pair,
            Err(code) => return ProcessReturn::failed(code),
        };

        if balance > info.balance {
            return ProcessReturn::failed(ProcessResult::NegativeSpend);
        }
        let amount = info.balance - balance;

        let details = BlockDetails::new(Epoch::Epoch0, true, false, false);
        if lattica_work::difficulty::value(&block.root(), work)
            < self.params.work.threshold(&details)
        {
            return ProcessReturn::failed(ProcessResult::InsufficientWork);
        }

        let previous_balance = info.balance;
        let height = info.block_count + 1;
        block.set_sideband(BlockSideband::new(
            BlockHash::ZERO,
            account,
            balance,
            height,
            seconds_since_epoch(),
            details,
            Epoch::Invalid,
        ));
        let new_info = AccountInfo {
            head: hash,
            representative: info.representative,
            open_block: info.open_block,
            balance,
            modified: seconds_since_epoch(),
            block_count: height,
            epoch: Epoch::Epoch0,
        };
        if self.apply(txn, block, &Some(info), new_info).is_err() {
            return ProcessReturn::failed(ProcessResult::Old);
        }
        let _ = self.store.pending().put(
            txn,
            &PendingKey::new(destination, hash),
            &PendingInfo::new(account, amount, Epoch::Epoch0),
        );

        ProcessReturn {
            code: ProcessResult::Progress,
            account,
            amount,
            pending_account: destination,
            is_send: true,
            verified: SignatureVerification::Valid,
            previous_balance,
        }
    }

    fn process_receive(&self, txn: &mut dyn WriteTransaction, block: &mut Block) -> ProcessReturn {
        let hash = block.hash();
        if self.block_exists(txn.as_transaction(), &hash) {
            return ProcessReturn::failed(ProcessResult::Old);
        }
        let Block::Receive(receive) = &*block else { unreachable!() };
        let previous = receive.previous;
        let source = receive.source;
        let signature = receive.signature;
        let work = receive.work;

        let Some(legacy) = self.legacy_preamble(txn.as_transaction(), block, &previous, &signature)
        else {
            return ProcessReturn::failed(ProcessResult::GapPrevious);
        };
        let (account, info) = match legacy {
            Ok(pair) => pair,
            Err(code) => return ProcessReturn::failed(code),
        };

        if !self.block_exists(txn.as_transaction(), &source) {
            return ProcessReturn::failed(ProcessResult::GapSource);
        }
        let key = PendingKey::new(account, source);
        let Some(pending) = self.store.pending().get(txn.as_transaction(), &key) else {
            return ProcessReturn::failed(ProcessResult::Unreceivable);
        };
        if pending.epoch > Epoch::Epoch0 {
            // Upgraded sends must be received with a state block.
            return ProcessReturn::failed(ProcessResult::Unreceivable);
        }

        let details = BlockDetails::new(Epoch::Epoch0, false, true, false);
        if lattica_work::difficulty::value(&block.root(), work)
            < self.params.work.threshold(&details)
        {
            return ProcessReturn::failed(ProcessResult::InsufficientWork);
        }

        let previous_balance = info.balance;
        let balance = info.balance.saturating_add(pending.amount);
        let height = info.block_count + 1;
        block.set_sideband(BlockSideband::new(
            BlockHash::ZERO,
            account,
            balance,
            height,
            seconds_since_epoch(),
            details,
            pending.epoch,
        ));
        let new_info = AccountInfo {
            head: hash,
            representative: info.representative,
            open_block: info.open_block,
            balance,
            modified: seconds_since_epoch(),
            block_count: height,
            epoch: Epoch::Epoch0,
        };
        if self.apply(txn, block, &Some(info), new_info).is_err() {
            return ProcessReturn::failed(ProcessResult::Old);
        }
        let _ = self.store.pending().del(txn, &key);

        ProcessReturn {
            code: ProcessResult::Progress,
            account,
            amount: pending.amount,
            pending_account: PublicKey::ZERO,
            is_send: false,
            verified: SignatureVerification::Valid,
            previous_balance,
        }
    }

    fn process_open(&self, txn: &mut dyn WriteTransaction, block: &mut Block) -> ProcessReturn {
        let hash = block.hash();
        if self.block_exists(txn.as_transaction(), &hash) {
            return ProcessReturn::failed(ProcessResult::Old);
        }
        let Block::Open(open) = &*block else { unreachable!() };
        let account = open.account;
        let source = open.source;
        let representative = open.representative;
        let signature = open.signature;
        let work = open.work;

        if !verify_message(hash.as_bytes(), &signature, &account) {
            return ProcessReturn::failed(ProcessResult::BadSignature);
        }
        if account == BURN_ACCOUNT {
            return ProcessReturn::failed(ProcessResult::OpenedBurnAccount);
        }
        if self
            .store
            .accounts()
            .get(txn.as_transaction(), &account)
            .is_some()
        {
            return ProcessReturn::failed(ProcessResult::Fork);
        }
        if !self.block_exists(txn.as_transaction(), &source) {
            return ProcessReturn::failed(ProcessResult::GapSource);
        }
        let key = PendingKey::new(account, source);
        let Some(pending) = self.store.pending().get(txn.as_transaction(), &key) else {
            return ProcessReturn::failed(ProcessResult::Unreceivable);
        };
        if pending.epoch > Epoch::Epoch0 {
            return ProcessReturn::failed(ProcessResult::Unreceivable);
        }

        let details = BlockDetails::new(Epoch::Epoch0, false, true, false);
        if lattica_work::difficulty::value(&block.root(), work)
            < self.params.work.threshold(&details)
        {
            return ProcessReturn::failed(ProcessResult::InsufficientWork);
        }

        block.set_sideband(BlockSideband::new(
            BlockHash::ZERO,
            account,
            pending.amount,
            1,
            seconds_since_epoch(),
            details,
            pending.epoch,
        ));
        let new_info = AccountInfo {
            head: hash,
            representative,
            open_block: hash,
            balance: pending.amount,
            modified: seconds_since_epoch(),
            block_count: 1,
            epoch: Epoch::Epoch0,
        };
        if self.apply(txn, block, &None, new_info).is_err() {
            return ProcessReturn::failed(ProcessResult::Old);
        }
        let _ = self.store.pending().del(txn, &key);

        ProcessReturn {
            code: ProcessResult::Progress,
            account,
            amount: pending.amount,
            pending_account: PublicKey::ZERO,
            is_send: false,
            verified: SignatureVerification::Valid,
            previous_balance: Amount::ZERO,
        }
    }

    fn process_change(&self, txn: &mut dyn WriteTransaction, block: &mut Block) -> ProcessReturn {
        let hash = block.hash();
        if self.block_exists(txn.as_transaction(), &hash) {
            return ProcessReturn::failed(ProcessResult::Old);
        }
        let Block::Change(change) = &*block else { unreachable!() };
        let previous = change.previous;
        let representative = change.representative;
        let signature = change.signature;
        let work = change.work;

        let Some(legacy) = self.legacy_preamble(txn.as_transaction(), block, &previous, &signature)
        else {
            return ProcessReturn::failed(ProcessResult::GapPrevious);
        };
        let (account, info) = match legacy {
            Ok(pair) => pair,
            Err(code) => return ProcessReturn::failed(code),
        };

        let details = BlockDetails::new(Epoch::Epoch0, false, false, false);
        if lattica_work::difficulty::value(&block.root(), work)
            < self.params.work.threshold(&details)
        {
            return ProcessReturn::failed(ProcessResult::InsufficientWork);
        }

        let previous_balance = info.balance;
        let height = info.block_count + 1;
        block.set_sideband(BlockSideband::new(
            BlockHash::ZERO,
            account,
            info.balance,
            height,
            seconds_since_epoch(),
            details,
            Epoch::Invalid,
        ));
        let new_info = AccountInfo {
            head: hash,
            representative,
            open_block: info.open_block,
            balance: info.balance,
            modified: seconds_since_epoch(),
            block_count: height,
            epoch: Epoch::Epoch0,
        };
        if self.apply(txn, block, &Some(info), new_info).is_err() {
            return ProcessReturn::failed(ProcessResult::Old);
        }

        ProcessReturn {
            code: ProcessResult::Progress,
            account,
            amount: Amount::ZERO,
            pending_account: PublicKey::ZERO,
            is_send: false,
            verified: SignatureVerification::Valid,
            previous_balance,
        }
    }

    /// Shared legacy-block admission: resolve the owning account from
    /// `previous`, check chain position, account epoch and signature.
    ///
    /// `None` means the previous block is unknown (gap); `Some(Err(code))`
    /// carries any other rejection.
    #[allow(clippy::type_complexity)]
    fn legacy_preamble(
        &self,
        txn: &dyn Transaction,
        block: &Block,
        previous: &BlockHash,
        signature: &lattica_types::Signature,
    ) -> Option<Result<(PublicKey, AccountInfo), ProcessResult>> {
        if !self.block_exists(txn, previous) {
            return None;
        }
        let Some(account) = self.account(txn, previous) else {
            return Some(Err(ProcessResult::GapPrevious));
        };
        let Some(info) = self.store.accounts().get(txn, &account) else {
            return Some(Err(ProcessResult::GapPrevious));
        };
        if info.head != *previous {
            return Some(Err(ProcessResult::Fork));
        }
        // Legacy forms are frozen at epoch 0; upgraded accounts must use
        // state blocks.
        if info.epoch != Epoch::Epoch0 {
            return Some(Err(ProcessResult::BlockPosition));
        }
        if !verify_message(block.hash().as_bytes(), signature, &account) {
            return Some(Err(ProcessResult::BadSignature));
        }
        Some(Ok((account, info)))
    }

    // ── Rollback ─────────────────────────────────────────────────────────

    /// Reverse the owning account's chain from its head back to and
    /// including `hash`, restoring pending entries, weights and successor
    /// pointers. Dependent receives on other accounts are rolled back
    /// recursively. Returns the removed blocks, head-most first.
    pub fn rollback(
        &self,
        txn: &mut dyn WriteTransaction,
        hash: &BlockHash,
    ) -> Result<Vec<Block>, RollbackError> {
        let mut rolled_back = Vec::new();
        self.rollback_inner(txn, hash, &mut rolled_back, 0)?;
        Ok(rolled_back)
    }

    fn rollback_inner(
        &self,
        txn: &mut dyn WriteTransaction,
        hash: &BlockHash,
        rolled_back: &mut Vec<Block>,
        depth: usize,
    ) -> Result<(), RollbackError> {
        if depth > 64 {
            return Err(RollbackError::Corrupt("rollback recursion too deep"));
        }
        let block = self
            .block_get(txn.as_transaction(), hash)
            .ok_or(RollbackError::NotFound)?;
        let sideband = block
            .sideband()
            .cloned()
            .ok_or(RollbackError::Corrupt("stored block lacks sideband"))?;
        let account = sideband.account;
        if let Some(confirmed) = self
            .store
            .confirmation_height()
            .get(txn.as_transaction(), &account)
        {
            if confirmed.height >= sideband.height {
                return Err(RollbackError::Cemented);
            }
        }

        while self.block_exists(txn.as_transaction(), hash) {
            let info = self
                .store
                .accounts()
                .get(txn.as_transaction(), &account)
                .ok_or(RollbackError::Corrupt("account missing during rollback"))?;
            let head = self
                .block_get(txn.as_transaction(), &info.head)
                .ok_or(RollbackError::Corrupt("head block missing"))?;
            self.rollback_one(txn, &head, &info, rolled_back, depth)?;
        }
        Ok(())
    }

    fn rollback_one(
        &self,
        txn: &mut dyn WriteTransaction,
        block: &Block,
        info: &AccountInfo,
        rolled_back: &mut Vec<Block>,
        depth: usize,
    ) -> Result<(), RollbackError> {
        let hash = block.hash();
        let sideband = block
            .sideband()
            .cloned()
            .ok_or(RollbackError::Corrupt("stored block lacks sideband"))?;
        let account = sideband.account;
        let previous = block.previous();

        if sideband.details.is_send {
            let destination = block
                .destination()
                .unwrap_or_else(|| PublicKey::from(block.link()));
            let key = PendingKey::new(destination, hash);
            // If the send was already received, the receiving chain has to
            // go first.
            while self
                .store
                .pending()
                .get(txn.as_transaction(), &key)
                .is_none()
            {
                let receiver = self
                    .find_receive(txn.as_transaction(), &destination, &hash)
                    .ok_or(RollbackError::Corrupt("received send has no receive block"))?;
                self.rollback_inner(txn, &receiver, rolled_back, depth + 1)?;
            }
            self.store.pending().del(txn, &key)?;
        }

        if sideband.details.is_receive {
            let source = match block {
                Block::State(state) => BlockHash::from(state.link),
                other => other.source().unwrap_or(BlockHash::ZERO),
            };
            let amount = self.amount(txn.as_transaction(), &hash).unwrap_or(Amount::ZERO);
            let source_account = self
                .account(txn.as_transaction(), &source)
                .unwrap_or(PublicKey::ZERO);
            self.store.pending().put(
                txn,
                &PendingKey::new(account, source),
                &PendingInfo::new(source_account, amount, sideband.source_epoch),
            )?;
        }

        // Reverse the weight movement.
        self.rep_weights
            .representation_subtract(info.representative, sideband.balance);
        if previous.is_zero() {
            self.store.accounts().del(txn, &account)?;
            self.cache.account_count.fetch_sub(1, Ordering::Relaxed);
        } else {
            let previous_block = self
                .block_get(txn.as_transaction(), &previous)
                .ok_or(RollbackError::Corrupt("previous block missing"))?;
            let previous_sideband = previous_block
                .sideband()
                .cloned()
                .ok_or(RollbackError::Corrupt("previous block lacks sideband"))?;
            let previous_rep = self.representative_calculated(txn.as_transaction(), &previous);
            self.rep_weights
                .representation_add(previous_rep, previous_sideband.balance);
            self.store.accounts().put(
                txn,
                &account,
                &AccountInfo {
                    head: previous,
                    representative: previous_rep,
                    open_block: info.open_block,
                    balance: previous_sideband.balance,
                    modified: seconds_since_epoch(),
                    block_count: info.block_count - 1,
                    epoch: previous_sideband.details.epoch,
                },
            )?;
            self.store
                .blocks()
                .successor_set(txn, &previous, BlockHash::ZERO)?;
        }

        self.store.blocks().del(txn, &hash)?;
        self.cache.block_count.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(%hash, account = %account, "rolled back block");
        rolled_back.push(block.clone());
        Ok(())
    }

    /// Find the block in `account`'s chain that received `source`.
    fn find_receive(
        &self,
        txn: &dyn Transaction,
        account: &PublicKey,
        source: &BlockHash,
    ) -> Option<BlockHash> {
        let mut current = self.latest(txn, account)?;
        while !current.is_zero() {
            let block = self.block_get(txn, &current)?;
            let matches = match &block {
                Block::State(state) => {
                    block
                        .sideband()
                        .map(|s| s.details.is_receive)
                        .unwrap_or(false)
                        && BlockHash::from(state.link) == *source
                }
                other => other.source() == Some(*source),
            };
            if matches {
                return Some(current);
            }
            current = block.previous();
        }
        None
    }
}
