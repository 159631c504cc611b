//! Inbound vote admission and routing.
//!
//! Votes queue up ahead of signature verification; admission tightens as
//! the queue fills so that, under pressure, only representatives with real
//! stake keep getting through. Verified votes route to the live elections,
//! and votes that arrive early land in the vote cache.

use crate::active_elections::{ActiveElections, VoteCode};
use crate::online_weight::OnlineReps;
use crate::vote_cache::VoteCache;
use lattica_blocks::Vote;
use lattica_ledger::Ledger;
use lattica_types::PublicKey;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Stake tiers relative to the online stake.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum RepTier {
    None,
    /// > 0.1% of online stake.
    Tier1,
    /// > 1%.
    Tier2,
    /// > 5%.
    Tier3,
}

/// Cumulative tier sets: a tier-3 representative is also in tiers 1 and 2.
#[derive(Default)]
pub struct RepTiers {
    pub tier1: HashSet<PublicKey>,
    pub tier2: HashSet<PublicKey>,
    pub tier3: HashSet<PublicKey>,
}

impl RepTiers {
    pub fn tier_of(&self, rep: &PublicKey) -> RepTier {
        if self.tier3.contains(rep) {
            RepTier::Tier3
        } else if self.tier2.contains(rep) {
            RepTier::Tier2
        } else if self.tier1.contains(rep) {
            RepTier::Tier1
        } else {
            RepTier::None
        }
    }
}

type VoteObserver = Box<dyn Fn(&Arc<Vote>, VoteCode) + Send + Sync>;

pub struct VoteProcessor {
    ledger: Arc<Ledger>,
    active: Arc<ActiveElections>,
    online: Arc<OnlineReps>,
    queue: Mutex<VecDeque<Arc<Vote>>>,
    capacity: usize,
    tiers: RwLock<RepTiers>,
    overflow_count: AtomicU64,
    processed_count: AtomicU64,
    vote_cache: Mutex<VoteCache>,
    observers: Mutex<Vec<VoteObserver>>,
}

impl VoteProcessor {
    pub fn new(
        ledger: Arc<Ledger>,
        active: Arc<ActiveElections>,
        online: Arc<OnlineReps>,
    ) -> Self {
        let capacity = if ledger.params.is_test() { 144 } else { 6144 };
        Self {
            ledger,
            active,
            online,
            queue: Mutex::new(VecDeque::new()),
            capacity,
            tiers: RwLock::new(RepTiers::default()),
            overflow_count: AtomicU64::new(0),
            processed_count: AtomicU64::new(0),
            vote_cache: Mutex::new(VoteCache::new()),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: VoteObserver) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Recompute the tier sets from current weights and online stake.
    pub fn calculate_weights(&self) {
        let online = self.online.effective().number();
        let snapshot = self.ledger.rep_weights.snapshot();
        let mut tiers = RepTiers::default();
        for (rep, weight) in snapshot.iter() {
            let weight = weight.number();
            if weight > online / 1000 {
                tiers.tier1.insert(*rep);
            }
            if weight > online / 100 {
                tiers.tier2.insert(*rep);
            }
            if weight > online / 20 {
                tiers.tier3.insert(*rep);
            }
        }
        *self.tiers.write().unwrap() = tiers;
    }

    pub fn tier_of(&self, rep: &PublicKey) -> RepTier {
        self.tiers.read().unwrap().tier_of(rep)
    }

    /// Admit `vote` to the queue, applying the fill-dependent tier policy.
    /// Returns false when the vote was dropped.
    pub fn vote(&self, vote: Arc<Vote>) -> bool {
        let tier = self.tier_of(&vote.voting_account);
        let mut queue = self.queue.lock().unwrap();
        let len = queue.len();
        let admitted = if len < self.capacity * 6 / 9 {
            true
        } else if len < self.capacity * 7 / 9 {
            tier >= RepTier::Tier1
        } else if len < self.capacity * 8 / 9 {
            tier >= RepTier::Tier2
        } else if len < self.capacity {
            tier >= RepTier::Tier3
        } else {
            false
        };
        if admitted {
            queue.push_back(vote);
        } else {
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
        }
        admitted
    }

    /// Validate and route one vote immediately, bypassing the queue.
    pub fn vote_blocking(&self, vote: &Arc<Vote>) -> VoteCode {
        let code = if !vote.validate() {
            VoteCode::Invalid
        } else {
            self.online.observe(vote.voting_account);
            let code = self.active.vote(vote);
            if code == VoteCode::Indeterminate {
                // Keep the weight around for when the election starts.
                let weight = self.ledger.weight(&vote.voting_account);
                let mut cache = self.vote_cache.lock().unwrap();
                for hash in vote.hashes() {
                    cache.insert(hash, vote.voting_account, vote.sequence, weight);
                }
            }
            code
        };
        self.processed_count.fetch_add(1, Ordering::Relaxed);
        for observer in self.observers.lock().unwrap().iter() {
            observer(vote, code);
        }
        code
    }

    /// Drain and process the whole queue; returns how many were processed.
    pub fn flush(&self) -> usize {
        let mut processed = 0;
        loop {
            let Some(vote) = self.queue.lock().unwrap().pop_front() else {
                break;
            };
            self.vote_blocking(&vote);
            processed += 1;
        }
        processed
    }

    /// Replay cached early votes for `hash` into its (new) election.
    pub fn flush_cached(&self, hash: &lattica_types::BlockHash) -> usize {
        let drained = self.vote_cache.lock().unwrap().drain(hash);
        let count = drained.len();
        for (voter, sequence) in drained {
            let vote = Vote {
                voting_account: voter,
                signature: lattica_types::Signature::ZERO,
                sequence,
                payload: lattica_blocks::VotePayload::Hashes(vec![*hash]),
            };
            // Signature was checked on the way into the cache.
            self.active.vote(&vote);
        }
        count
    }

    pub fn vote_cache_tally(&self, hash: &lattica_types::BlockHash) -> lattica_types::Amount {
        self.vote_cache.lock().unwrap().tally(hash)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }
}
