//! Vote table: representative → latest vote (highest sequence observed).

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;
use lattica_blocks::Vote;
use lattica_types::PublicKey;
use std::sync::Arc;

pub trait VoteStore: Send + Sync {
    fn put(
        &self,
        txn: &mut dyn WriteTransaction,
        rep: &PublicKey,
        vote: &Vote,
    ) -> Result<(), StoreError>;

    fn get(&self, txn: &dyn Transaction, rep: &PublicKey) -> Option<Arc<Vote>>;

    fn del(&self, txn: &mut dyn WriteTransaction, rep: &PublicKey) -> Result<(), StoreError>;

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&PublicKey, &Arc<Vote>) -> bool);
}

/// Storage layout: sequence (8 LE) ‖ signature (64) ‖ hash count (1) ‖ hashes.
pub fn vote_bytes(vote: &Vote) -> Vec<u8> {
    let hashes = vote.hashes();
    let mut out = Vec::with_capacity(8 + 64 + 1 + hashes.len() * 32);
    out.extend_from_slice(&vote.sequence.to_le_bytes());
    out.extend_from_slice(vote.signature.as_bytes());
    out.push(hashes.len() as u8);
    for hash in &hashes {
        out.extend_from_slice(hash.as_bytes());
    }
    out
}

/// Inverse of [`vote_bytes`]; the representative comes from the table key.
pub fn vote_from_bytes(rep: &PublicKey, bytes: &[u8]) -> Option<Vote> {
    if bytes.len() < 8 + 64 + 1 {
        return None;
    }
    let sequence = u64::from_le_bytes(bytes[..8].try_into().unwrap());
    let signature = lattica_types::Signature::new(bytes[8..72].try_into().unwrap());
    let count = bytes[72] as usize;
    let tail = &bytes[73..];
    if count > lattica_blocks::MAX_VOTE_HASHES || tail.len() != count * 32 {
        return None;
    }
    let hashes = tail
        .chunks(32)
        .map(|chunk| lattica_types::BlockHash::new(chunk.try_into().unwrap()))
        .collect();
    Some(Vote {
        voting_account: *rep,
        signature,
        sequence,
        payload: lattica_blocks::VotePayload::Hashes(hashes),
    })
}
