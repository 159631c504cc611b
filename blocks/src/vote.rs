//! Representative votes.
//!
//! A vote covers either a single block or up to [`MAX_VOTE_HASHES`] block
//! hashes. The signed digest is domain-separated with a `"vote "` prefix so
//! a vote can never be replayed as a block signature or vice versa.

use crate::block::Block;
use lattica_crypto::{sign_message, verify_message, Blake2bHasher, RawKey};
use lattica_types::{BlockHash, PublicKey, Signature};
use std::sync::Arc;

/// Wire cap on hashes per vote.
pub const MAX_VOTE_HASHES: usize = 12;

const VOTE_PREFIX: &[u8] = b"vote ";

/// Payload of a vote: a full block (legacy) or a list of hashes.
#[derive(Clone, Debug)]
pub enum VotePayload {
    Block(Arc<Block>),
    Hashes(Vec<BlockHash>),
}

/// A representative's signed statement about one or more blocks.
#[derive(Clone, Debug)]
pub struct Vote {
    pub voting_account: PublicKey,
    pub signature: Signature,
    /// Strictly increasing per representative; replay protection.
    pub sequence: u64,
    pub payload: VotePayload,
}

impl Vote {
    /// Create and sign a hashes vote. Panics in debug builds if the hash
    /// list exceeds the wire cap; callers chunk first.
    pub fn new(
        voting_account: PublicKey,
        prv: &RawKey,
        sequence: u64,
        hashes: Vec<BlockHash>,
    ) -> Self {
        debug_assert!(hashes.len() <= MAX_VOTE_HASHES);
        let mut vote = Self {
            voting_account,
            signature: Signature::ZERO,
            sequence,
            payload: VotePayload::Hashes(hashes),
        };
        vote.signature = sign_message(vote.hash().as_bytes(), prv);
        vote
    }

    /// Create and sign a full-block vote.
    pub fn new_block(
        voting_account: PublicKey,
        prv: &RawKey,
        sequence: u64,
        block: Arc<Block>,
    ) -> Self {
        let mut vote = Self {
            voting_account,
            signature: Signature::ZERO,
            sequence,
            payload: VotePayload::Block(block),
        };
        vote.signature = sign_message(vote.hash().as_bytes(), prv);
        vote
    }

    /// The hashes this vote endorses.
    pub fn hashes(&self) -> Vec<BlockHash> {
        match &self.payload {
            VotePayload::Block(block) => vec![block.hash()],
            VotePayload::Hashes(hashes) => hashes.clone(),
        }
    }

    /// Signed digest: `"vote "` ‖ hashes ‖ sequence (LE).
    pub fn hash(&self) -> BlockHash {
        let mut hasher = Blake2bHasher::new();
        hasher.update(VOTE_PREFIX);
        match &self.payload {
            VotePayload::Block(block) => {
                hasher.update(block.hash().as_bytes());
            }
            VotePayload::Hashes(hashes) => {
                for hash in hashes {
                    hasher.update(hash.as_bytes());
                }
            }
        }
        hasher.update(&self.sequence.to_le_bytes());
        BlockHash::new(hasher.finalize())
    }

    /// Whether the signature matches the voting account.
    pub fn validate(&self) -> bool {
        verify_message(
            self.hash().as_bytes(),
            &self.signature,
            &self.voting_account,
        )
    }

    /// Digest covering identity and content, used by the uniquer.
    pub fn full_hash(&self) -> BlockHash {
        let mut hasher = Blake2bHasher::new();
        hasher
            .update(self.hash().as_bytes())
            .update(self.voting_account.as_bytes())
            .update(self.signature.as_bytes());
        BlockHash::new(hasher.finalize())
    }
}

impl PartialEq for Vote {
    fn eq(&self, other: &Self) -> bool {
        self.voting_account == other.voting_account
            && self.signature == other.signature
            && self.sequence == other.sequence
            && self.hashes() == other.hashes()
    }
}

impl Eq for Vote {}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_crypto::KeyPair;

    fn hashes(n: u8) -> Vec<BlockHash> {
        (0..n).map(|i| BlockHash::new([i + 1; 32])).collect()
    }

    #[test]
    fn signed_vote_validates() {
        let keypair = KeyPair::from_seed([1; 32]);
        let vote = Vote::new(keypair.public, &keypair.private, 1, hashes(3));
        assert!(vote.validate());
    }

    #[test]
    fn tampered_sequence_fails_validation() {
        let keypair = KeyPair::from_seed([1; 32]);
        let mut vote = Vote::new(keypair.public, &keypair.private, 1, hashes(3));
        vote.sequence = 2;
        assert!(!vote.validate());
    }

    #[test]
    fn hash_covers_sequence() {
        let keypair = KeyPair::from_seed([1; 32]);
        let a = Vote::new(keypair.public, &keypair.private, 1, hashes(2));
        let b = Vote::new(keypair.public, &keypair.private, 2, hashes(2));
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn hash_covers_payload_order() {
        let keypair = KeyPair::from_seed([1; 32]);
        let mut reversed = hashes(2);
        reversed.reverse();
        let a = Vote::new(keypair.public, &keypair.private, 1, hashes(2));
        let b = Vote::new(keypair.public, &keypair.private, 1, reversed);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn block_vote_hashes_like_single_hash_vote() {
        let keypair = KeyPair::from_seed([1; 32]);
        let block = Arc::new(
            crate::builder::StateBlockBuilder::new()
                .account(keypair.public)
                .previous(BlockHash::ZERO)
                .representative(keypair.public)
                .balance(lattica_types::Amount::raw(1))
                .link(lattica_types::Link::ZERO)
                .build()
                .unwrap(),
        );
        let by_block = Vote::new_block(keypair.public, &keypair.private, 5, block.clone());
        let by_hash = Vote::new(keypair.public, &keypair.private, 5, vec![block.hash()]);
        assert_eq!(by_block.hash(), by_hash.hash());
    }

    #[test]
    fn full_hash_distinguishes_voters() {
        let a = KeyPair::from_seed([1; 32]);
        let b = KeyPair::from_seed([2; 32]);
        let va = Vote::new(a.public, &a.private, 1, hashes(1));
        let vb = Vote::new(b.public, &b.private, 1, hashes(1));
        assert_eq!(va.hash(), vb.hash());
        assert_ne!(va.full_hash(), vb.full_hash());
    }
}
