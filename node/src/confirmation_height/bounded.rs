//! The bounded cementer.
//!
//! Walks ancestors in fixed-size chunks and remembers per-account progress
//! in `accounts_confirmed_info`, so a multi-million-block backlog cements
//! without holding more than one chunk in memory. Work is expressed as
//! `WriteDetails` ranges whose bottom always equals the account's stored
//! confirmation height plus one at apply time.

use lattica_blocks::Block;
use lattica_ledger::Ledger;
use lattica_store::{
    ConfirmationHeightInfo, ReadTransaction, Store, Transaction, WriteDatabaseQueue,
    WriteTransaction, Writer,
};
use lattica_types::{BlockHash, PublicKey};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Blocks read per traversal chunk.
pub const BATCH_READ_SIZE: u64 = 65_536;

/// Safety bound on traversal iterations per call.
const MAX_ITERATIONS: usize = 1 << 20;

/// A contiguous per-account cement range, bottom and top inclusive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteDetails {
    pub account: PublicKey,
    pub bottom_height: u64,
    pub bottom_hash: BlockHash,
    pub top_height: u64,
    pub top_hash: BlockHash,
}

/// Per-account progress within one processing session.
struct ConfirmedInfo {
    confirmed_height: u64,
}

pub struct BoundedProcessor {
    ledger: Arc<Ledger>,
    accounts_confirmed_info: HashMap<PublicKey, ConfirmedInfo>,
    pending_writes: VecDeque<WriteDetails>,
}

impl BoundedProcessor {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            accounts_confirmed_info: HashMap::new(),
            pending_writes: VecDeque::new(),
        }
    }

    pub fn pending_writes(&self) -> bool {
        !self.pending_writes.is_empty()
    }

    /// Cement `target` and everything it depends on. Returns the cemented
    /// blocks in apply order.
    pub fn process(&mut self, write_queue: &WriteDatabaseQueue, target: &BlockHash) -> Vec<Block> {
        {
            let txn = self.ledger.store.tx_begin_read();
            self.traverse(txn.as_transaction(), target);
        }
        let cemented = self.cement_pending(write_queue);
        self.accounts_confirmed_info.clear();
        cemented
    }

    /// Confirmed height for `account`, preferring session progress.
    fn confirmed_height(&self, txn: &dyn Transaction, account: &PublicKey) -> u64 {
        if let Some(info) = self.accounts_confirmed_info.get(account) {
            return info.confirmed_height;
        }
        self.ledger
            .store
            .confirmation_height()
            .get(txn, account)
            .map(|info| info.height)
            .unwrap_or(0)
    }

    fn source_requires_cementing(&self, txn: &dyn Transaction, source: &BlockHash) -> bool {
        let Some(block) = self.ledger.block_get(txn, source) else {
            return false;
        };
        let Some(sideband) = block.sideband() else {
            return false;
        };
        sideband.height > self.confirmed_height(txn, &sideband.account)
    }

    fn traverse(&mut self, txn: &dyn Transaction, target: &BlockHash) {
        let mut stack: Vec<BlockHash> = vec![*target];
        let mut iterations = 0usize;

        while let Some(current) = stack.last().copied() {
            iterations += 1;
            if iterations > MAX_ITERATIONS {
                tracing::warn!("bounded cementer hit its iteration bound; resuming later");
                break;
            }
            let Some(block) = self.ledger.block_get(txn, &current) else {
                stack.pop();
                continue;
            };
            let Some(sideband) = block.sideband().cloned() else {
                stack.pop();
                continue;
            };
            let account = sideband.account;
            let confirmed = self.confirmed_height(txn, &account);
            if sideband.height <= confirmed {
                stack.pop();
                continue;
            }

            // Walk down towards confirmed+1, one chunk at a time, noting
            // the lowest receive whose source still needs cementing.
            let mut cursor = block;
            let mut cursor_height = sideband.height;
            let mut bottom_hash = current;
            let mut bottom_height = sideband.height;
            let mut blocking: Option<(u64, BlockHash)> = None; // (receive height, source)
            let mut steps = 0u64;
            loop {
                if let Some(source) = self.ledger.receive_source(txn, &cursor) {
                    if self.source_requires_cementing(txn, &source) {
                        blocking = Some((cursor_height, source));
                    }
                }
                bottom_hash = cursor.hash();
                bottom_height = cursor_height;
                if cursor_height == confirmed + 1 {
                    break;
                }
                steps += 1;
                if steps >= BATCH_READ_SIZE {
                    break;
                }
                let previous = cursor.previous();
                let Some(next) = self.ledger.block_get(txn, &previous) else {
                    break;
                };
                cursor_height -= 1;
                cursor = next;
            }

            if bottom_height > confirmed + 1 {
                // Chunk cap hit before reaching the frontier: recurse into
                // the checkpoint first, keeping `current` queued.
                stack.push(bottom_hash);
                continue;
            }

            match blocking {
                Some((receive_height, source)) => {
                    // Cement everything strictly below the blocking receive,
                    // then the sending chain, then come back.
                    if receive_height > confirmed + 1 {
                        let below_top_height = receive_height - 1;
                        let below_top = self
                            .hash_at_height(txn, &bottom_hash, bottom_height, below_top_height);
                        self.queue_write(txn, account, bottom_hash, bottom_height, below_top_height, below_top);
                    }
                    stack.push(source);
                }
                None => {
                    self.queue_write(
                        txn,
                        account,
                        bottom_hash,
                        bottom_height,
                        sideband.height,
                        current,
                    );
                    stack.pop();
                }
            }
        }
    }

    /// Walk successors from (`bottom_hash`, `bottom_height`) up to `height`.
    fn hash_at_height(
        &self,
        txn: &dyn Transaction,
        bottom_hash: &BlockHash,
        bottom_height: u64,
        height: u64,
    ) -> BlockHash {
        let mut current = *bottom_hash;
        for _ in bottom_height..height {
            match self.ledger.store.blocks().successor(txn, &current) {
                Some(successor) => current = successor,
                None => break,
            }
        }
        current
    }

    fn queue_write(
        &mut self,
        _txn: &dyn Transaction,
        account: PublicKey,
        bottom_hash: BlockHash,
        bottom_height: u64,
        top_height: u64,
        top_hash: BlockHash,
    ) {
        debug_assert!(bottom_height <= top_height);
        self.pending_writes.push_back(WriteDetails {
            account,
            bottom_height,
            bottom_hash,
            top_height,
            top_hash,
        });
        self.accounts_confirmed_info
            .insert(account, ConfirmedInfo {
                confirmed_height: top_height,
            });
    }

    /// Apply queued ranges in order; returns cemented blocks in apply order.
    fn cement_pending(&mut self, write_queue: &WriteDatabaseQueue) -> Vec<Block> {
        if self.pending_writes.is_empty() {
            return Vec::new();
        }
        let _guard = write_queue.wait(Writer::ConfirmationHeight);
        let mut txn = self.ledger.store.tx_begin_write();
        let mut cemented = Vec::new();

        while let Some(details) = self.pending_writes.pop_front() {
            let stored = self
                .ledger
                .store
                .confirmation_height()
                .get(txn.as_transaction(), &details.account)
                .unwrap_or_default();
            // A range is only valid if it extends the stored frontier by
            // exactly one; anything else means an overlapping write landed
            // first and the range must be clipped.
            if details.top_height <= stored.height {
                continue;
            }
            debug_assert_eq!(details.bottom_height, stored.height + 1);

            // Collect the range top-down via previous pointers, then emit
            // ascending.
            let mut range = Vec::with_capacity((details.top_height - stored.height) as usize);
            let mut cursor = details.top_hash;
            for _ in stored.height..details.top_height {
                let Some(block) = self.ledger.block_get(txn.as_transaction(), &cursor) else {
                    break;
                };
                let previous = block.previous();
                range.push(block);
                cursor = previous;
            }
            range.reverse();

            let info = ConfirmationHeightInfo::new(details.top_height, details.top_hash);
            if let Err(error) =
                self.ledger
                    .store
                    .confirmation_height()
                    .put(&mut *txn, &details.account, &info)
            {
                tracing::error!(%error, "bounded confirmation height write failed");
                break;
            }
            cemented.extend(range);
        }

        if let Err(error) = txn.commit() {
            tracing::error!(%error, "bounded cement commit failed");
            return Vec::new();
        }
        tracing::debug!(count = cemented.len(), "cemented (bounded)");
        cemented
    }
}
