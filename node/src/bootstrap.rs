//! Block synchronization attempts.
//!
//! Three modes share one pull queue. Legacy walks a peer's frontier list
//! and pulls every account that differs; lazy chases an unknown hash
//! backwards (and sideways into state-receive sources) until everything
//! connects; wallet-lazy resolves a set of accounts. The transport is
//! injected by the node: this module owns the decision state only, which
//! keeps it deterministic under test.

use lattica_blocks::Block;
use lattica_ledger::Ledger;
use lattica_store::{ReadTransaction, Store, Transaction};
use lattica_types::{BlockHash, PublicKey};
use lattica_utils::{StatCategory, StatDetail, Stats};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Recent pulls remembered to avoid repeating failures.
const PULLS_CACHE_MAX: usize = 10_000;

/// Give up on a pull after this many attempts.
const PULL_RETRY_LIMIT: u32 = 5;

/// Serving bulk-push traffic stops once this cost is accumulated.
pub const BULK_PUSH_COST_LIMIT: u64 = 200;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BootstrapMode {
    Legacy,
    Lazy,
    WalletLazy,
}

/// One bulk-pull work item.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PullInfo {
    /// Account or head hash, as bulk_pull's start field.
    pub start: [u8; 32],
    /// Stop walking at this hash (exclusive); zero to the open block.
    pub end: BlockHash,
    pub attempts: u32,
}

impl PullInfo {
    fn key(&self) -> ([u8; 32], BlockHash) {
        (self.start, self.end)
    }
}

/// LRU of recently attempted pulls.
pub struct PullsCache {
    entries: Mutex<(VecDeque<([u8; 32], BlockHash)>, HashSet<([u8; 32], BlockHash)>)>,
}

impl PullsCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new((VecDeque::new(), HashSet::new())),
        }
    }

    pub fn add(&self, pull: &PullInfo) {
        let mut entries = self.entries.lock().unwrap();
        let key = pull.key();
        if entries.1.insert(key) {
            entries.0.push_back(key);
            if entries.0.len() > PULLS_CACHE_MAX {
                if let Some(old) = entries.0.pop_front() {
                    entries.1.remove(&old);
                }
            }
        }
    }

    pub fn contains(&self, pull: &PullInfo) -> bool {
        self.entries.lock().unwrap().1.contains(&pull.key())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().0.len()
    }
}

impl Default for PullsCache {
    fn default() -> Self {
        Self::new()
    }
}

/// One synchronization attempt.
pub struct BootstrapAttempt {
    pub mode: BootstrapMode,
    ledger: Arc<Ledger>,
    stats: Arc<Stats>,
    pulls_cache: Arc<PullsCache>,
    pulls: Mutex<VecDeque<PullInfo>>,
    /// Lazy state: hashes queued or already handled this attempt.
    lazy_keys: Mutex<HashSet<BlockHash>>,
    bulk_push_cost: AtomicU64,
    stopped: AtomicBool,
}

impl BootstrapAttempt {
    pub fn new(
        mode: BootstrapMode,
        ledger: Arc<Ledger>,
        stats: Arc<Stats>,
        pulls_cache: Arc<PullsCache>,
    ) -> Self {
        Self {
            mode,
            ledger,
            stats,
            pulls_cache,
            pulls: Mutex::new(VecDeque::new()),
            lazy_keys: Mutex::new(HashSet::new()),
            bulk_push_cost: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn queue_pull(&self, pull: PullInfo) {
        if self.pulls_cache.contains(&pull) {
            return;
        }
        self.pulls.lock().unwrap().push_back(pull);
    }

    /// Next pull to issue, if any.
    pub fn next_pull(&self) -> Option<PullInfo> {
        if self.stopped() {
            return None;
        }
        self.pulls.lock().unwrap().pop_front()
    }

    pub fn pull_count(&self) -> usize {
        self.pulls.lock().unwrap().len()
    }

    /// Requeue a failed pull until its retry budget runs out; exhausted
    /// pulls are remembered so the next attempt skips them.
    pub fn pull_failed(&self, mut pull: PullInfo) {
        pull.attempts += 1;
        self.stats.inc(StatCategory::Bootstrap, StatDetail::PullFailed);
        if pull.attempts >= PULL_RETRY_LIMIT {
            tracing::debug!(end = %pull.end, "pull abandoned after retries");
            self.pulls_cache.add(&pull);
        } else {
            self.pulls.lock().unwrap().push_back(pull);
        }
    }

    pub fn pull_succeeded(&self) {
        self.stats
            .inc(StatCategory::Bootstrap, StatDetail::PullFinished);
    }

    // ── Legacy ───────────────────────────────────────────────────────────

    /// Handle one (account, their frontier) row from a frontier_req scan.
    /// Queues a pull when the peer's chain differs from ours; returns true
    /// if the peer appears to be missing blocks we have (bulk-push case).
    pub fn received_frontier(&self, account: PublicKey, their_head: BlockHash) -> bool {
        debug_assert_eq!(self.mode, BootstrapMode::Legacy);
        let txn = self.ledger.store.tx_begin_read();
        let our_head = self.ledger.latest(txn.as_transaction(), &account);
        match our_head {
            Some(head) if head == their_head => false,
            Some(head) => {
                if self
                    .ledger
                    .block_exists(txn.as_transaction(), &their_head)
                {
                    // We are ahead: the peer needs our blocks.
                    true
                } else {
                    self.queue_pull(PullInfo {
                        start: *account.as_bytes(),
                        end: head,
                        attempts: 0,
                    });
                    false
                }
            }
            None => {
                self.queue_pull(PullInfo {
                    start: *account.as_bytes(),
                    end: BlockHash::ZERO,
                    attempts: 0,
                });
                false
            }
        }
    }

    /// Account for served bulk-push traffic; true while under the limit.
    pub fn add_bulk_push_cost(&self, cost: u64) -> bool {
        let total = self.bulk_push_cost.fetch_add(cost, Ordering::Relaxed) + cost;
        total <= BULK_PUSH_COST_LIMIT
    }

    // ── Lazy ─────────────────────────────────────────────────────────────

    /// Seed a lazy attempt with an unknown hash.
    pub fn lazy_start(&self, hash: BlockHash) {
        debug_assert_ne!(self.mode, BootstrapMode::Legacy);
        let mut keys = self.lazy_keys.lock().unwrap();
        if keys.insert(hash) {
            self.queue_pull(PullInfo {
                start: *hash.as_bytes(),
                end: BlockHash::ZERO,
                attempts: 0,
            });
        }
    }

    /// Inspect a pulled block and queue whatever it depends on that we
    /// still lack: its predecessor, and for state receives the source.
    pub fn lazy_block_received(&self, block: &Block) {
        let txn = self.ledger.store.tx_begin_read();
        let previous = block.previous();
        let previous_known =
            previous.is_zero() || self.known(txn.as_transaction(), &previous);
        if !previous_known {
            self.lazy_start_locked(previous);
        }
        // With the previous balance at hand the block classifies cleanly;
        // without it a nonzero link may be a source, so chase it.
        let source = match block {
            Block::State(state)
                if !previous_known
                    && !state.link.is_zero()
                    && !self.ledger.is_epoch_link(&state.link) =>
            {
                Some(BlockHash::from(state.link))
            }
            _ => self.ledger.receive_source(txn.as_transaction(), block),
        };
        if let Some(source) = source {
            if !self.known(txn.as_transaction(), &source) {
                self.lazy_start_locked(source);
            }
        }
    }

    fn lazy_start_locked(&self, hash: BlockHash) {
        let mut keys = self.lazy_keys.lock().unwrap();
        if keys.insert(hash) {
            self.queue_pull(PullInfo {
                start: *hash.as_bytes(),
                end: BlockHash::ZERO,
                attempts: 0,
            });
        }
    }

    fn known(&self, txn: &dyn Transaction, hash: &BlockHash) -> bool {
        self.lazy_keys.lock().unwrap().contains(hash)
            || self.ledger.block_exists(txn, hash)
    }

    // ── Wallet lazy ──────────────────────────────────────────────────────

    /// Queue frontier resolution for a wallet account.
    pub fn wallet_start(&self, account: PublicKey) {
        debug_assert_eq!(self.mode, BootstrapMode::WalletLazy);
        self.queue_pull(PullInfo {
            start: *account.as_bytes(),
            end: BlockHash::ZERO,
            attempts: 0,
        });
    }
}

// ── Server side ──────────────────────────────────────────────────────────

/// Answer a frontier_req: accounts from `start` in key order, limited to
/// `count` rows and, when `age` is nonzero, to accounts modified within
/// the last `age` seconds.
pub fn frontier_req_response(
    ledger: &Ledger,
    start: &PublicKey,
    age: u32,
    count: u32,
) -> Vec<(PublicKey, BlockHash)> {
    let txn = ledger.store.tx_begin_read();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let mut rows = Vec::new();
    ledger
        .store
        .accounts()
        .for_each_from(txn.as_transaction(), start, &mut |account, info| {
            if age == 0 || now.saturating_sub(info.modified) <= age as u64 {
                rows.push((*account, info.head));
            }
            (rows.len() as u32) < count
        });
    rows
}

/// Answer a bulk_pull: walk from the account head (or from `start` as a
/// block hash) down to `end` exclusive, newest first, capped by `count`
/// (zero meaning unlimited).
pub fn bulk_pull_response(
    ledger: &Ledger,
    start: &[u8; 32],
    end: &BlockHash,
    count: u32,
) -> Vec<Block> {
    let txn = ledger.store.tx_begin_read();
    let mut cursor = if let Some(info) = ledger
        .store
        .accounts()
        .get(txn.as_transaction(), &PublicKey::new(*start))
    {
        info.head
    } else {
        BlockHash::new(*start)
    };
    let mut blocks = Vec::new();
    while !cursor.is_zero() && cursor != *end {
        let Some(block) = ledger.block_get(txn.as_transaction(), &cursor) else {
            break;
        };
        cursor = block.previous();
        blocks.push(block);
        if count != 0 && blocks.len() as u32 >= count {
            break;
        }
    }
    blocks
}

/// Owns the current attempt and the shared pulls cache.
pub struct BootstrapInitiator {
    ledger: Arc<Ledger>,
    stats: Arc<Stats>,
    pub pulls_cache: Arc<PullsCache>,
    current: Mutex<Option<Arc<BootstrapAttempt>>>,
}

impl BootstrapInitiator {
    pub fn new(ledger: Arc<Ledger>, stats: Arc<Stats>) -> Self {
        Self {
            ledger,
            stats,
            pulls_cache: Arc::new(PullsCache::new()),
            current: Mutex::new(None),
        }
    }

    pub fn bootstrap(&self, mode: BootstrapMode) -> Arc<BootstrapAttempt> {
        let attempt = Arc::new(BootstrapAttempt::new(
            mode,
            Arc::clone(&self.ledger),
            Arc::clone(&self.stats),
            Arc::clone(&self.pulls_cache),
        ));
        let mut current = self.current.lock().unwrap();
        if let Some(previous) = current.take() {
            previous.stop();
        }
        *current = Some(Arc::clone(&attempt));
        attempt
    }

    /// Start (or reuse) a lazy attempt for `hash`; the gap cache's
    /// vote-driven trigger lands here.
    pub fn bootstrap_lazy(&self, hash: BlockHash) -> Arc<BootstrapAttempt> {
        let mut current = self.current.lock().unwrap();
        let reuse = matches!(
            current.as_ref(),
            Some(attempt) if attempt.mode == BootstrapMode::Lazy && !attempt.stopped()
        );
        if !reuse {
            if let Some(previous) = current.take() {
                previous.stop();
            }
            *current = Some(Arc::new(BootstrapAttempt::new(
                BootstrapMode::Lazy,
                Arc::clone(&self.ledger),
                Arc::clone(&self.stats),
                Arc::clone(&self.pulls_cache),
            )));
        }
        let attempt = current.as_ref().unwrap().clone();
        attempt.lazy_start(hash);
        attempt
    }

    pub fn current_attempt(&self) -> Option<Arc<BootstrapAttempt>> {
        self.current.lock().unwrap().clone()
    }

    pub fn stop(&self) {
        if let Some(attempt) = self.current.lock().unwrap().take() {
            attempt.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_blocks::StateBlockBuilder;
    use lattica_crypto::KeyPair;
    use lattica_ledger::Genesis;
    use lattica_store::WriteTransaction;
    use lattica_store_lmdb::{LmdbConfig, LmdbStore};
    use lattica_types::{Amount, Link, NetworkKind, NetworkParams, GENESIS_AMOUNT};

    fn fixture() -> (tempfile::TempDir, Arc<Ledger>, BootstrapInitiator) {
        let dir = tempfile::tempdir().unwrap();
        let config = LmdbConfig {
            map_size: 64 * 1024 * 1024,
            ..Default::default()
        };
        let store = Arc::new(LmdbStore::open(dir.path(), &config).unwrap());
        let genesis = Genesis::new(NetworkKind::Test);
        let params = NetworkParams::new(NetworkKind::Test).with_epochs(genesis.account);
        let ledger = Arc::new(Ledger::new(store, params, &genesis).unwrap());
        let initiator = BootstrapInitiator::new(Arc::clone(&ledger), Arc::new(Stats::new()));
        (dir, ledger, initiator)
    }

    #[test]
    fn legacy_frontier_differences_queue_pulls() {
        let (_dir, ledger, initiator) = fixture();
        let attempt = initiator.bootstrap(BootstrapMode::Legacy);

        // Unknown account: pull from scratch.
        assert!(!attempt.received_frontier(PublicKey::new([1; 32]), BlockHash::new([2; 32])));
        // Genesis with a foreign head: pull the difference.
        assert!(!attempt.received_frontier(ledger.genesis_account(), BlockHash::new([3; 32])));
        assert_eq!(attempt.pull_count(), 2);
        // Matching frontier: nothing to do.
        assert!(!attempt.received_frontier(ledger.genesis_account(), ledger.genesis_hash()));
        assert_eq!(attempt.pull_count(), 2);
    }

    #[test]
    fn legacy_detects_push_candidates() {
        let (_dir, ledger, initiator) = fixture();
        let attempt = initiator.bootstrap(BootstrapMode::Legacy);
        let genesis_key = Genesis::new(NetworkKind::Test).key.unwrap();

        // Extend our chain so the peer's (older) frontier is one we know.
        let mut txn = ledger.store.tx_begin_write();
        let mut send = StateBlockBuilder::new()
            .account(genesis_key.public)
            .previous(ledger.genesis_hash())
            .representative(genesis_key.public)
            .balance(Amount::raw(GENESIS_AMOUNT - 1))
            .link(Link::new([5; 32]))
            .sign(&genesis_key)
            .build()
            .unwrap();
        send.set_work(
            (0u64..)
                .find(|&w| {
                    lattica_work::difficulty::value(&send.root(), w) >= ledger.params.work.base
                })
                .unwrap(),
        );
        ledger.process(&mut *txn, &mut send);
        txn.commit().unwrap();

        assert!(attempt.received_frontier(ledger.genesis_account(), ledger.genesis_hash()));
    }

    #[test]
    fn lazy_chases_previous_and_source() {
        let (_dir, ledger, initiator) = fixture();
        let attempt = initiator.bootstrap_lazy(BlockHash::new([9; 32]));
        assert_eq!(attempt.pull_count(), 1);

        // A pulled state receive: unknown previous and unknown source both
        // get queued; the known genesis hash does not.
        let key = KeyPair::from_seed([1; 32]);
        let block = StateBlockBuilder::new()
            .account(key.public)
            .previous(BlockHash::new([0x10; 32]))
            .representative(key.public)
            .balance(Amount::raw(50))
            .link(Link::new([0x20; 32]))
            .build()
            .unwrap();
        attempt.lazy_block_received(&block);
        // previous + source queued (receive inferred because the previous
        // balance is unknown while the link is nonzero).
        assert_eq!(attempt.pull_count(), 3);

        let known = StateBlockBuilder::new()
            .account(key.public)
            .previous(ledger.genesis_hash())
            .representative(key.public)
            .balance(Amount::raw(50))
            .link(Link::ZERO)
            .build()
            .unwrap();
        attempt.lazy_block_received(&known);
        assert_eq!(attempt.pull_count(), 3);
    }

    #[test]
    fn pull_retry_budget_and_cache() {
        let (_dir, _ledger, initiator) = fixture();
        let attempt = initiator.bootstrap(BootstrapMode::Lazy);
        attempt.lazy_start(BlockHash::new([1; 32]));
        let mut pull = attempt.next_pull().unwrap();
        for _ in 0..PULL_RETRY_LIMIT {
            attempt.pull_failed(pull.clone());
            match attempt.next_pull() {
                Some(requeued) => pull = requeued,
                None => break,
            }
        }
        assert_eq!(attempt.pull_count(), 0);
        assert_eq!(initiator.pulls_cache.len(), 1);

        // A fresh attempt skips the cached failure.
        let next = initiator.bootstrap(BootstrapMode::Lazy);
        next.lazy_start(BlockHash::new([1; 32]));
        assert_eq!(next.pull_count(), 0);
    }

    #[test]
    fn frontier_and_bulk_pull_servers_answer_from_ledger() {
        let (_dir, ledger, _initiator) = fixture();
        let genesis_key = Genesis::new(NetworkKind::Test).key.unwrap();

        let mut txn = ledger.store.tx_begin_write();
        let mut send = StateBlockBuilder::new()
            .account(genesis_key.public)
            .previous(ledger.genesis_hash())
            .representative(genesis_key.public)
            .balance(Amount::raw(GENESIS_AMOUNT - 1))
            .link(Link::new([5; 32]))
            .sign(&genesis_key)
            .build()
            .unwrap();
        send.set_work(
            (0u64..)
                .find(|&w| {
                    lattica_work::difficulty::value(&send.root(), w) >= ledger.params.work.base
                })
                .unwrap(),
        );
        ledger.process(&mut *txn, &mut send);
        txn.commit().unwrap();

        let frontiers = frontier_req_response(&ledger, &PublicKey::ZERO, 0, 100);
        assert_eq!(frontiers.len(), 1);
        assert_eq!(frontiers[0], (ledger.genesis_account(), send.hash()));

        // Pull the whole chain by account, newest first.
        let blocks = bulk_pull_response(
            &ledger,
            ledger.genesis_account().as_bytes(),
            &BlockHash::ZERO,
            0,
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].hash(), send.hash());
        assert_eq!(blocks[1].hash(), ledger.genesis_hash());

        // End bound excludes everything at and below it.
        let partial = bulk_pull_response(
            &ledger,
            ledger.genesis_account().as_bytes(),
            &ledger.genesis_hash(),
            0,
        );
        assert_eq!(partial.len(), 1);
    }

    #[test]
    fn bulk_push_cost_limit() {
        let (_dir, _ledger, initiator) = fixture();
        let attempt = initiator.bootstrap(BootstrapMode::Legacy);
        assert!(attempt.add_bulk_push_cost(150));
        assert!(attempt.add_bulk_push_cost(50));
        assert!(!attempt.add_bulk_push_cost(1));
    }

    #[test]
    fn new_attempt_stops_previous() {
        let (_dir, _ledger, initiator) = fixture();
        let first = initiator.bootstrap(BootstrapMode::Legacy);
        let second = initiator.bootstrap(BootstrapMode::WalletLazy);
        assert!(first.stopped());
        assert!(!second.stopped());
        second.wallet_start(PublicKey::new([1; 32]));
        assert_eq!(second.pull_count(), 1);
    }
}
