//! Recently seen gaps and the vote-driven bootstrap trigger.
//!
//! A block whose predecessor or source is missing parks in the unchecked
//! table; its root is remembered here. When enough representative weight
//! votes for a gapped block, the missing chain is evidently real and a
//! lazy bootstrap for it is triggered.

use lattica_ledger::Ledger;
use lattica_types::{Amount, BlockHash, PublicKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

const MAX_GAPS: usize = 256;

struct GapEntry {
    arrival: Instant,
    voters: Vec<PublicKey>,
    bootstrap_started: bool,
}

type BootstrapTrigger = Box<dyn Fn(BlockHash) + Send + Sync>;

pub struct GapCache {
    ledger: Arc<Ledger>,
    entries: Mutex<HashMap<BlockHash, GapEntry>>,
    trigger: Mutex<Option<BootstrapTrigger>>,
}

impl GapCache {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            entries: Mutex::new(HashMap::new()),
            trigger: Mutex::new(None),
        }
    }

    /// Install the lazy-bootstrap hook.
    pub fn set_bootstrap_trigger(&self, trigger: BootstrapTrigger) {
        *self.trigger.lock().unwrap() = Some(trigger);
    }

    /// Record that `hash` arrived with a missing dependency.
    pub fn add(&self, hash: BlockHash) {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= MAX_GAPS {
            // Evict the oldest entry.
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.arrival)
                .map(|(hash, _)| *hash)
            {
                entries.remove(&oldest);
            }
        }
        entries.entry(hash).or_insert_with(|| GapEntry {
            arrival: Instant::now(),
            voters: Vec::new(),
            bootstrap_started: false,
        });
    }

    /// Record a representative vote touching `hash`. Once accumulated
    /// voter weight passes half the online minimum, kick off bootstrap.
    pub fn vote(&self, hash: &BlockHash, voter: PublicKey) {
        let threshold = Amount::raw(self.ledger.params.online_weight_minimum / 2);
        let should_trigger = {
            let mut entries = self.entries.lock().unwrap();
            let Some(entry) = entries.get_mut(hash) else {
                return;
            };
            if entry.bootstrap_started || entry.voters.contains(&voter) {
                return;
            }
            entry.voters.push(voter);
            let tally = entry
                .voters
                .iter()
                .fold(Amount::ZERO, |sum, rep| {
                    sum.saturating_add(self.ledger.weight(rep))
                });
            if tally > threshold {
                entry.bootstrap_started = true;
                true
            } else {
                false
            }
        };
        if should_trigger {
            tracing::info!(%hash, "gap reached vote threshold, starting lazy bootstrap");
            if let Some(trigger) = self.trigger.lock().unwrap().as_ref() {
                trigger(*hash);
            }
        }
    }

    /// Drop the entry once the dependency arrived.
    pub fn erase(&self, hash: &BlockHash) {
        self.entries.lock().unwrap().remove(hash);
    }

    pub fn size(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn bootstrap_started(&self, hash: &BlockHash) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(hash)
            .map(|entry| entry.bootstrap_started)
            .unwrap_or(false)
    }
}
