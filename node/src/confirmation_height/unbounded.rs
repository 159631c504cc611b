//! The unbounded cementer.
//!
//! Source-first depth traversal that keeps the whole plan in memory:
//! cheap and simple while the uncemented backlog is small. For each
//! uncemented receive on the way to the target, the sending chain is
//! planned first, so the final plan is a topological order.

use lattica_blocks::Block;
use lattica_ledger::Ledger;
use lattica_store::{
    ConfirmationHeightInfo, ReadTransaction, Store, Transaction, WriteDatabaseQueue,
    WriteTransaction, Writer,
};
use lattica_types::{BlockHash, PublicKey};
use std::collections::HashMap;

/// Conf-height writes per transaction before renewing.
const WRITE_BATCH: usize = 4096;

/// Cement everything `target` depends on, then `target`'s chain itself.
/// Returns the cemented blocks in the order observers must see them.
pub fn cement(
    ledger: &Ledger,
    write_queue: &WriteDatabaseQueue,
    target: &BlockHash,
) -> Vec<Block> {
    let plan = {
        let txn = ledger.store.tx_begin_read();
        plan(ledger, txn.as_transaction(), target)
    };
    if plan.is_empty() {
        return plan;
    }

    let _guard = write_queue.wait(Writer::ConfirmationHeight);
    let mut txn = ledger.store.tx_begin_write();
    let mut writes_since_renew = 0;
    for block in &plan {
        let sideband = block.sideband().expect("planned blocks are stored");
        let info = ConfirmationHeightInfo::new(sideband.height, block.hash());
        if let Err(error) =
            ledger
                .store
                .confirmation_height()
                .put(&mut *txn, &sideband.account, &info)
        {
            tracing::error!(%error, "confirmation height write failed");
            return Vec::new();
        }
        writes_since_renew += 1;
        if writes_since_renew >= WRITE_BATCH {
            if let Err(error) = txn.renew() {
                tracing::error!(%error, "confirmation height batch commit failed");
                return Vec::new();
            }
            writes_since_renew = 0;
        }
    }
    if let Err(error) = txn.commit() {
        tracing::error!(%error, "confirmation height commit failed");
        return Vec::new();
    }
    tracing::debug!(count = plan.len(), target = %target, "cemented (unbounded)");
    plan
}

/// Build the topological cement plan for `target`.
fn plan(ledger: &Ledger, txn: &dyn Transaction, target: &BlockHash) -> Vec<Block> {
    let mut plan: Vec<Block> = Vec::new();
    // Heights already covered, persisted or planned this pass.
    let mut planned_heights: HashMap<PublicKey, u64> = HashMap::new();
    let mut stack: Vec<BlockHash> = vec![*target];

    while let Some(current) = stack.pop() {
        let Some(block) = ledger.block_get(txn, &current) else {
            continue;
        };
        let Some(sideband) = block.sideband().cloned() else {
            continue;
        };
        let account = sideband.account;
        let covered = covered_height(ledger, txn, &mut planned_heights, &account);
        if sideband.height <= covered {
            continue;
        }

        // Collect the uncemented segment [covered+1 ..= height], top down.
        let mut segment: Vec<Block> = Vec::new();
        let mut cursor = block;
        loop {
            let cursor_height = cursor.sideband().map(|s| s.height).unwrap_or(0);
            if cursor_height <= covered {
                break;
            }
            let previous = cursor.previous();
            segment.push(cursor);
            if previous.is_zero() {
                break;
            }
            let Some(next) = ledger.block_get(txn, &previous) else {
                break;
            };
            cursor = next;
        }

        // Any receive in the segment whose source is not yet covered forces
        // the sending chain to be planned first.
        let mut blocking_sources: Vec<BlockHash> = Vec::new();
        for candidate in segment.iter().rev() {
            if let Some(source) = ledger.receive_source(txn, candidate) {
                if !source_covered(ledger, txn, &planned_heights, &source) {
                    blocking_sources.push(source);
                }
            }
        }
        if !blocking_sources.is_empty() {
            stack.push(current);
            // LIFO: the lowest receive's source must be planned first.
            while let Some(source) = blocking_sources.pop() {
                stack.push(source);
            }
            continue;
        }

        planned_heights.insert(account, sideband.height);
        plan.extend(segment.into_iter().rev());
    }
    plan
}

fn covered_height(
    ledger: &Ledger,
    txn: &dyn Transaction,
    planned: &mut HashMap<PublicKey, u64>,
    account: &PublicKey,
) -> u64 {
    if let Some(height) = planned.get(account) {
        return *height;
    }
    let stored = ledger
        .store
        .confirmation_height()
        .get(txn, account)
        .map(|info| info.height)
        .unwrap_or(0);
    planned.insert(*account, stored);
    stored
}

fn source_covered(
    ledger: &Ledger,
    txn: &dyn Transaction,
    planned: &HashMap<PublicKey, u64>,
    source: &BlockHash,
) -> bool {
    let Some(block) = ledger.block_get(txn, source) else {
        // Missing source: pruned or foreign; nothing to cement.
        return true;
    };
    let Some(sideband) = block.sideband() else {
        return true;
    };
    if let Some(height) = planned.get(&sideband.account) {
        if *height >= sideband.height {
            return true;
        }
    }
    ledger.block_confirmed(txn, source)
}
