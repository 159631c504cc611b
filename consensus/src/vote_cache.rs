//! Votes that arrive before their election exists.
//!
//! Representatives broadcast as soon as they see a block; a node that is
//! still processing it would otherwise drop that weight on the floor. The
//! cache keeps per-voter deduplicated entries with running tallies so an
//! election can be seeded the moment it starts.

use lattica_types::{Amount, BlockHash, PublicKey};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const MAX_CACHE_ENTRIES: usize = 65_536;
const MAX_VOTERS_PER_HASH: usize = 64;
const CACHE_TTL: Duration = Duration::from_secs(900);

#[derive(Clone)]
struct CachedVote {
    voter: PublicKey,
    sequence: u64,
    weight: Amount,
    arrived: Instant,
}

struct CacheEntry {
    votes: Vec<CachedVote>,
    tally: Amount,
}

/// Pre-election vote storage keyed by block hash.
pub struct VoteCache {
    entries: HashMap<BlockHash, CacheEntry>,
}

impl VoteCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Cache a vote. Duplicate voters are replaced only by strictly newer
    /// sequences; a full entry evicts its lightest voter for a heavier one.
    pub fn insert(&mut self, hash: BlockHash, voter: PublicKey, sequence: u64, weight: Amount) {
        if self.entries.len() >= MAX_CACHE_ENTRIES {
            self.cleanup();
        }
        let entry = self.entries.entry(hash).or_insert_with(|| CacheEntry {
            votes: Vec::new(),
            tally: Amount::ZERO,
        });

        if let Some(existing) = entry.votes.iter_mut().find(|v| v.voter == voter) {
            if sequence > existing.sequence {
                entry.tally = entry.tally.saturating_sub(existing.weight);
                existing.sequence = sequence;
                existing.weight = weight;
                existing.arrived = Instant::now();
                entry.tally = entry.tally.saturating_add(weight);
            }
            return;
        }

        if entry.votes.len() >= MAX_VOTERS_PER_HASH {
            let lightest = entry
                .votes
                .iter()
                .enumerate()
                .min_by_key(|(_, v)| v.weight)
                .map(|(i, v)| (i, v.weight));
            match lightest {
                Some((index, lightest_weight)) if weight > lightest_weight => {
                    let removed = entry.votes.remove(index);
                    entry.tally = entry.tally.saturating_sub(removed.weight);
                }
                _ => return,
            }
        }

        entry.tally = entry.tally.saturating_add(weight);
        entry.votes.push(CachedVote {
            voter,
            sequence,
            weight,
            arrived: Instant::now(),
        });
    }

    /// Remove and return all cached votes for `hash`, `(voter, sequence)`
    /// pairs ready to replay into a fresh election.
    pub fn drain(&mut self, hash: &BlockHash) -> Vec<(PublicKey, u64)> {
        self.entries
            .remove(hash)
            .map(|entry| {
                entry
                    .votes
                    .into_iter()
                    .map(|v| (v.voter, v.sequence))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Accumulated weight behind `hash`.
    pub fn tally(&self, hash: &BlockHash) -> Amount {
        self.entries
            .get(hash)
            .map(|entry| entry.tally)
            .unwrap_or(Amount::ZERO)
    }

    /// The `count` heaviest hashes, strongest first. Used to seed hinted
    /// elections for blocks the network clearly cares about.
    pub fn top(&self, count: usize) -> Vec<(BlockHash, Amount)> {
        let mut all: Vec<(BlockHash, Amount)> = self
            .entries
            .iter()
            .map(|(hash, entry)| (*hash, entry.tally))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1));
        all.truncate(count);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cleanup(&mut self) {
        self.entries.retain(|_, entry| {
            entry.votes.retain(|vote| vote.arrived.elapsed() < CACHE_TTL);
            entry.tally = entry
                .votes
                .iter()
                .fold(Amount::ZERO, |sum, v| sum.saturating_add(v.weight));
            !entry.votes.is_empty()
        });
    }
}

impl Default for VoteCache {
    fn default() -> Self {
        Self::new()
    }
}
