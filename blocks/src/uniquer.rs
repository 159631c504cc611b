//! Weak-keyed deduplication of blocks and votes.
//!
//! The store, elections and gossip layer all hold copies of the same block;
//! routing every freshly parsed instance through the uniquer makes them
//! converge on one shared allocation. Entries hold weak references so the
//! uniquer never extends a block's lifetime.

use crate::block::Block;
use crate::vote::Vote;
use lattica_types::BlockHash;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Dead weak entries are swept once the map grows past this.
const CLEANUP_THRESHOLD: usize = 8192;

/// Deduplicates blocks by hash.
pub struct BlockUniquer {
    blocks: Mutex<HashMap<BlockHash, Weak<Block>>>,
}

impl BlockUniquer {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the canonical instance for `block`, registering it if new.
    pub fn unique(&self, block: Arc<Block>) -> Arc<Block> {
        let key = block.hash();
        let mut map = self.blocks.lock().unwrap();
        if map.len() > CLEANUP_THRESHOLD {
            map.retain(|_, weak| weak.strong_count() > 0);
        }
        match map.get(&key).and_then(Weak::upgrade) {
            Some(existing) => existing,
            None => {
                map.insert(key, Arc::downgrade(&block));
                block
            }
        }
    }

    /// Live entries currently tracked.
    pub fn size(&self) -> usize {
        self.blocks
            .lock()
            .unwrap()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl Default for BlockUniquer {
    fn default() -> Self {
        Self::new()
    }
}

/// Deduplicates votes by their full hash (content + voter + signature).
pub struct VoteUniquer {
    votes: Mutex<HashMap<BlockHash, Weak<Vote>>>,
}

impl VoteUniquer {
    pub fn new() -> Self {
        Self {
            votes: Mutex::new(HashMap::new()),
        }
    }

    pub fn unique(&self, vote: Arc<Vote>) -> Arc<Vote> {
        let key = vote.full_hash();
        let mut map = self.votes.lock().unwrap();
        if map.len() > CLEANUP_THRESHOLD {
            map.retain(|_, weak| weak.strong_count() > 0);
        }
        match map.get(&key).and_then(Weak::upgrade) {
            Some(existing) => existing,
            None => {
                map.insert(key, Arc::downgrade(&vote));
                vote
            }
        }
    }

    pub fn size(&self) -> usize {
        self.votes
            .lock()
            .unwrap()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

impl Default for VoteUniquer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateBlockBuilder;
    use lattica_crypto::KeyPair;
    use lattica_types::{Amount, Link, PublicKey};

    fn make_block(balance: u128) -> Arc<Block> {
        Arc::new(
            StateBlockBuilder::new()
                .account(PublicKey::new([1; 32]))
                .previous(BlockHash::ZERO)
                .representative(PublicKey::new([2; 32]))
                .balance(Amount::raw(balance))
                .link(Link::ZERO)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn identical_blocks_converge() {
        let uniquer = BlockUniquer::new();
        let first = uniquer.unique(make_block(10));
        let second = uniquer.unique(make_block(10));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(uniquer.size(), 1);
    }

    #[test]
    fn distinct_blocks_stay_distinct() {
        let uniquer = BlockUniquer::new();
        let a = uniquer.unique(make_block(10));
        let b = uniquer.unique(make_block(11));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(uniquer.size(), 2);
    }

    #[test]
    fn dropped_blocks_do_not_count() {
        let uniquer = BlockUniquer::new();
        {
            let _block = uniquer.unique(make_block(10));
            assert_eq!(uniquer.size(), 1);
        }
        assert_eq!(uniquer.size(), 0);
        // A re-insert after the original died yields a fresh canonical copy.
        let again = uniquer.unique(make_block(10));
        assert_eq!(again.balance_field(), Some(Amount::raw(10)));
    }

    #[test]
    fn identical_votes_converge_distinct_sequences_do_not() {
        let keypair = KeyPair::from_seed([3; 32]);
        let uniquer = VoteUniquer::new();
        let v1 = uniquer.unique(Arc::new(Vote::new(
            keypair.public,
            &keypair.private,
            1,
            vec![BlockHash::new([5; 32])],
        )));
        let v1_again = uniquer.unique(Arc::new(Vote::new(
            keypair.public,
            &keypair.private,
            1,
            vec![BlockHash::new([5; 32])],
        )));
        let v2 = uniquer.unique(Arc::new(Vote::new(
            keypair.public,
            &keypair.private,
            2,
            vec![BlockHash::new([5; 32])],
        )));
        assert!(Arc::ptr_eq(&v1, &v1_again));
        assert!(!Arc::ptr_eq(&v1, &v2));
        assert_eq!(uniquer.size(), 2);
    }
}
