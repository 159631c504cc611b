//! Block work validation against the network thresholds.

use crate::difficulty;
use lattica_blocks::Block;
use lattica_types::{BlockDetails, WorkThresholds};

/// The threshold a block with these details must clear.
pub fn work_threshold(details: &BlockDetails, work: &WorkThresholds) -> u64 {
    work.threshold(details)
}

/// Admission check: does the block clear the *entry* threshold?
///
/// Used before the ledger knows the block's epoch and subtype; final
/// enforcement against the full per-details threshold happens in
/// `Ledger::process`.
pub fn validate_entry(block: &Block, work: &WorkThresholds) -> bool {
    difficulty::value(&block.root(), block.work()) >= work.entry
}

/// Ledger check: does the block clear the threshold for its details?
pub fn validate_block_work(block: &Block, details: &BlockDetails, work: &WorkThresholds) -> bool {
    difficulty::value(&block.root(), block.work()) >= work.threshold(details)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_blocks::StateBlockBuilder;
    use lattica_types::{Amount, BlockHash, Epoch, Link, PublicKey, Root, WorkThresholds};

    fn block_with_work(work_nonce: u64) -> Block {
        StateBlockBuilder::new()
            .account(PublicKey::new([1; 32]))
            .previous(BlockHash::new([2; 32]))
            .representative(PublicKey::new([3; 32]))
            .balance(Amount::raw(5))
            .link(Link::ZERO)
            .work(work_nonce)
            .build()
            .unwrap()
    }

    fn solve(root: &Root, threshold: u64) -> u64 {
        (0u64..)
            .find(|&w| difficulty::value(root, w) >= threshold)
            .unwrap()
    }

    #[test]
    fn entry_validation() {
        let thresholds = WorkThresholds::publish_test();
        let probe = block_with_work(0);
        let nonce = solve(&probe.root(), thresholds.entry);
        assert!(validate_entry(&block_with_work(nonce), &thresholds));
    }

    #[test]
    fn details_validation_uses_subtype_threshold() {
        let thresholds = WorkThresholds::publish_full();
        let receive_details = BlockDetails::new(Epoch::Epoch2, false, true, false);
        let send_details = BlockDetails::new(Epoch::Epoch2, true, false, false);
        let probe = block_with_work(0);
        // Solve only to the receive bar; it must not satisfy the send bar.
        let nonce = solve(&probe.root(), thresholds.epoch_2_receive);
        let block = block_with_work(nonce);
        assert!(validate_block_work(&block, &receive_details, &thresholds));
        assert!(!validate_block_work(&block, &send_details, &thresholds));
    }
}
