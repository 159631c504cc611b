//! Confirmation-request aggregation.
//!
//! Peers batch (hash, root) pairs asking for votes. The aggregator
//! deduplicates, answers from already-generated votes where it can, and
//! queues the rest on the vote generator. Requests for roots this node has
//! never seen are counted and discarded.

use crate::active_elections::ActiveElections;
use crate::voting::VoteGenerator;
use lattica_blocks::Vote;
use lattica_ledger::Ledger;
use lattica_store::{ReadTransaction, Store};
use lattica_types::{BlockHash, Root};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Cached recent local votes, looked up by root and hash.
pub struct LocalVoteHistory {
    votes: Mutex<HashMap<Root, Vec<Arc<Vote>>>>,
    max_roots: usize,
}

impl LocalVoteHistory {
    pub fn new(max_roots: usize) -> Self {
        Self {
            votes: Mutex::new(HashMap::new()),
            max_roots,
        }
    }

    pub fn add(&self, root: Root, vote: Arc<Vote>) {
        let mut votes = self.votes.lock().unwrap();
        if votes.len() >= self.max_roots && !votes.contains_key(&root) {
            // Drop an arbitrary old root; recency bookkeeping is not worth
            // the cost at this size.
            if let Some(old) = votes.keys().next().copied() {
                votes.remove(&old);
            }
        }
        let entry = votes.entry(root).or_default();
        entry.retain(|existing| existing.voting_account != vote.voting_account);
        entry.push(vote);
    }

    /// Votes for `root` that cover `hash`.
    pub fn votes(&self, root: &Root, hash: &BlockHash) -> Vec<Arc<Vote>> {
        self.votes
            .lock()
            .unwrap()
            .get(root)
            .map(|entry| {
                entry
                    .iter()
                    .filter(|vote| vote.hashes().contains(hash))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn size(&self) -> usize {
        self.votes.lock().unwrap().len()
    }
}

/// What the aggregator produced for one channel's batch.
#[derive(Default)]
pub struct AggregatorReply {
    /// Previously generated votes that already answer the request.
    pub cached: Vec<Arc<Vote>>,
    /// Hashes handed to the vote generator for fresh votes.
    pub to_generate: usize,
}

pub struct RequestAggregator {
    ledger: Arc<Ledger>,
    active: Arc<ActiveElections>,
    generator: Arc<VoteGenerator>,
    pub history: Arc<LocalVoteHistory>,
    /// Per-channel queued batches.
    queue: Mutex<VecDeque<(u64, Vec<(BlockHash, Root)>)>>,
    max_queued_requests: usize,
    unknown_count: AtomicU64,
}

impl RequestAggregator {
    pub fn new(
        ledger: Arc<Ledger>,
        active: Arc<ActiveElections>,
        generator: Arc<VoteGenerator>,
        history: Arc<LocalVoteHistory>,
    ) -> Self {
        Self {
            ledger,
            active,
            generator,
            history,
            queue: Mutex::new(VecDeque::new()),
            max_queued_requests: 128,
            unknown_count: AtomicU64::new(0),
        }
    }

    /// Queue a batch from `channel`. Duplicates within the batch are
    /// removed before it is stored. Returns false when the channel has too
    /// many batches in flight.
    pub fn add(&self, channel: u64, mut requests: Vec<(BlockHash, Root)>) -> bool {
        requests.sort();
        requests.dedup();
        let mut queue = self.queue.lock().unwrap();
        let in_flight = queue.iter().filter(|(ch, _)| *ch == channel).count();
        if in_flight >= self.max_queued_requests {
            return false;
        }
        queue.push_back((channel, requests));
        true
    }

    /// Drain the queue, resolving every request. Returns per-channel
    /// replies; freshly generated votes flow through the vote generator's
    /// sink and into the history.
    pub fn process_all(&self) -> Vec<(u64, AggregatorReply)> {
        let batches: Vec<(u64, Vec<(BlockHash, Root)>)> =
            self.queue.lock().unwrap().drain(..).collect();
        let txn = self.ledger.store.tx_begin_read();
        let mut replies = Vec::with_capacity(batches.len());
        for (channel, requests) in batches {
            let mut reply = AggregatorReply::default();
            for (hash, root) in requests {
                // Cheapest first: an already generated vote.
                let cached = self.history.votes(&root, &hash);
                if !cached.is_empty() {
                    reply.cached.extend(cached);
                    continue;
                }
                // A live election winner or any stored block can be voted on.
                let known = if let Some(winner) = self.active.winner_of(&hash) {
                    Some((winner.root(), winner.hash()))
                } else if let Some(block) = self.ledger.block_get(txn.as_transaction(), &hash) {
                    Some((block.root(), block.hash()))
                } else {
                    // Fall back to whatever this node has for the root: the
                    // successor or open block tells the peer our fork side.
                    self.ledger
                        .successor_by_root(txn.as_transaction(), &root)
                        .map(|block| (block.root(), block.hash()))
                };
                match known {
                    Some((vote_root, vote_hash)) => {
                        self.generator.add(vote_root, vote_hash);
                        reply.to_generate += 1;
                    }
                    None => {
                        self.unknown_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            replies.push((channel, reply));
        }
        replies
    }

    pub fn unknown_count(&self) -> u64 {
        self.unknown_count.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::online_weight::OnlineReps;
    use lattica_crypto::KeyPair;
    use lattica_ledger::Genesis;
    use lattica_store::{Store, WriteDatabaseQueue};
    use lattica_store_lmdb::{LmdbConfig, LmdbStore};
    use lattica_types::{NetworkKind, NetworkParams};

    struct Fixture {
        _dir: tempfile::TempDir,
        ledger: Arc<Ledger>,
        aggregator: RequestAggregator,
        history: Arc<LocalVoteHistory>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = LmdbConfig {
            map_size: 64 * 1024 * 1024,
            ..Default::default()
        };
        let store = Arc::new(LmdbStore::open(dir.path(), &config).unwrap());
        let genesis = Genesis::new(NetworkKind::Test);
        let params = NetworkParams::new(NetworkKind::Test).with_epochs(genesis.account);
        let ledger = Arc::new(Ledger::new(store, params, &genesis).unwrap());
        let online = Arc::new(OnlineReps::new(Arc::clone(&ledger)));
        let active = Arc::new(ActiveElections::new(
            Arc::clone(&ledger),
            Arc::clone(&online),
        ));
        let history = Arc::new(LocalVoteHistory::new(1024));
        let history_for_sink = Arc::clone(&history);
        let generator = Arc::new(VoteGenerator::new(
            Arc::clone(&ledger),
            Arc::new(WriteDatabaseQueue::new()),
            Box::new(move |vote| {
                for hash in vote.hashes() {
                    history_for_sink.add(Root::from(hash), Arc::clone(&vote));
                }
            }),
        ));
        generator.add_representative(Genesis::new(NetworkKind::Test).key.unwrap());
        let aggregator = RequestAggregator::new(
            Arc::clone(&ledger),
            active,
            generator,
            Arc::clone(&history),
        );
        Fixture {
            _dir: dir,
            ledger,
            aggregator,
            history,
        }
    }

    #[test]
    fn duplicates_removed_before_processing() {
        let fx = fixture();
        let genesis_hash = fx.ledger.genesis_hash();
        let request = (genesis_hash, Root::from(genesis_hash));
        assert!(fx.aggregator.add(1, vec![request, request, request]));
        let replies = fx.aggregator.process_all();
        assert_eq!(replies.len(), 1);
        // One deduplicated request, resolved against the ledger.
        assert_eq!(replies[0].1.to_generate, 1);
        assert_eq!(fx.aggregator.unknown_count(), 0);
    }

    #[test]
    fn unknown_roots_counted_once_each() {
        let fx = fixture();
        let bogus = BlockHash::new([0xAA; 32]);
        fx.aggregator
            .add(1, vec![(bogus, Root::new([0xAA; 32]))]);
        fx.aggregator.process_all();
        assert_eq!(fx.aggregator.unknown_count(), 1);
    }

    #[test]
    fn cached_votes_answer_repeat_requests() {
        let fx = fixture();
        let genesis_hash = fx.ledger.genesis_hash();
        let key = KeyPair::from_seed([5; 32]);
        let vote = Arc::new(Vote::new(
            key.public,
            &key.private,
            1,
            vec![genesis_hash],
        ));
        fx.history.add(Root::from(genesis_hash), vote);

        fx.aggregator
            .add(7, vec![(genesis_hash, Root::from(genesis_hash))]);
        let replies = fx.aggregator.process_all();
        assert_eq!(replies[0].1.cached.len(), 1);
        assert_eq!(replies[0].1.to_generate, 0);
    }

    #[test]
    fn channel_queue_capacity_enforced() {
        let fx = fixture();
        let request = vec![(BlockHash::new([1; 32]), Root::new([1; 32]))];
        for _ in 0..128 {
            assert!(fx.aggregator.add(3, request.clone()));
        }
        assert!(!fx.aggregator.add(3, request.clone()));
        // Other channels are unaffected.
        assert!(fx.aggregator.add(4, request));
    }
}
