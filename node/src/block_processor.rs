//! The block processing pipeline.
//!
//! Blocks from the network, local wallets, bootstrap and the unchecked
//! table funnel into one queue, drained in batches under a single write
//! transaction. The ledger is the arbiter; this layer handles everything
//! around the verdict: parking gapped blocks, waking their dependents,
//! reporting forks to the election machinery, and feeding observers.

use crate::gap_cache::GapCache;
use lattica_blocks::Block;
use lattica_ledger::{Ledger, ProcessResult, ProcessReturn};
use lattica_store::{
    ReadTransaction, Store, UncheckedInfo, UncheckedKey, WriteDatabaseQueue, WriteTransaction,
    Writer,
};
use lattica_types::BlockHash;
use lattica_utils::{StatCategory, StatDetail, Stats};
use lattica_work::validate_entry;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Blocks applied per write transaction.
const PROCESS_BATCH_MAX: usize = 256;

/// Where a block came from; local blocks outrank flood traffic.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockSource {
    Live,
    Local,
    Bootstrap,
    Unchecked,
}

type ProcessedObserver = Box<dyn Fn(&ProcessReturn, &Arc<Block>) + Send + Sync>;
type ForkObserver = Box<dyn Fn(&Arc<Block>) + Send + Sync>;

struct Queues {
    local: VecDeque<Arc<Block>>,
    remote: VecDeque<(Arc<Block>, BlockSource)>,
}

pub struct BlockProcessor {
    ledger: Arc<Ledger>,
    write_queue: Arc<WriteDatabaseQueue>,
    gap_cache: Arc<GapCache>,
    stats: Arc<Stats>,
    queues: Mutex<Queues>,
    processed_observers: Mutex<Vec<ProcessedObserver>>,
    fork_observers: Mutex<Vec<ForkObserver>>,
}

impl BlockProcessor {
    pub fn new(
        ledger: Arc<Ledger>,
        write_queue: Arc<WriteDatabaseQueue>,
        gap_cache: Arc<GapCache>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            ledger,
            write_queue,
            gap_cache,
            stats,
            queues: Mutex::new(Queues {
                local: VecDeque::new(),
                remote: VecDeque::new(),
            }),
            processed_observers: Mutex::new(Vec::new()),
            fork_observers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_processed_observer(&self, observer: ProcessedObserver) {
        self.processed_observers.lock().unwrap().push(observer);
    }

    pub fn add_fork_observer(&self, observer: ForkObserver) {
        self.fork_observers.lock().unwrap().push(observer);
    }

    /// Queue a block. Entry-threshold work is the admission price; blocks
    /// below it never reach the ledger.
    pub fn add(&self, block: Arc<Block>, source: BlockSource) -> bool {
        if !validate_entry(&block, &self.ledger.params.work) {
            self.stats.inc(StatCategory::Block, StatDetail::Invalid);
            return false;
        }
        let mut queues = self.queues.lock().unwrap();
        match source {
            BlockSource::Local => queues.local.push_back(block),
            _ => queues.remote.push_back((block, source)),
        }
        true
    }

    pub fn queue_len(&self) -> usize {
        let queues = self.queues.lock().unwrap();
        queues.local.len() + queues.remote.len()
    }

    fn next(&self) -> Option<(Arc<Block>, BlockSource)> {
        let mut queues = self.queues.lock().unwrap();
        if let Some(block) = queues.local.pop_front() {
            return Some((block, BlockSource::Local));
        }
        queues.remote.pop_front()
    }

    /// Drain up to one batch under a single write transaction. Returns the
    /// results in processing order.
    pub fn process_batch(&self) -> Vec<(ProcessReturn, Arc<Block>)> {
        if self.queue_len() == 0 {
            return Vec::new();
        }
        let guard = self.write_queue.wait(Writer::ProcessBatch);
        let mut txn = self.ledger.store.tx_begin_write();
        let mut results = Vec::new();
        let mut processed_hashes: Vec<BlockHash> = Vec::new();

        while results.len() < PROCESS_BATCH_MAX {
            let Some((block, source)) = self.next() else {
                break;
            };
            let mut owned = (*block).clone();
            let result = self.ledger.process(&mut *txn, &mut owned);
            self.stats.inc(StatCategory::Block, StatDetail::Process);
            match result.code {
                ProcessResult::Progress => {
                    self.stats.inc(StatCategory::Ledger, StatDetail::Process);
                    let hash = owned.hash();
                    processed_hashes.push(hash);
                    self.gap_cache.erase(&hash);
                    // Ledger attached the sideband; share the stored form.
                    results.push((result, Arc::new(owned)));
                    continue;
                }
                ProcessResult::GapPrevious => {
                    self.stats.inc(StatCategory::Block, StatDetail::Gap);
                    let key = UncheckedKey::new(owned.previous(), owned.hash());
                    let info = UncheckedInfo::new(
                        (*block).clone(),
                        owned.account_field().unwrap_or_default(),
                        seconds_since_epoch(),
                    );
                    let _ = self.ledger.store.unchecked().put(&mut *txn, &key, &info);
                    if source != BlockSource::Bootstrap {
                        self.gap_cache.add(owned.hash());
                    }
                }
                ProcessResult::GapSource => {
                    self.stats.inc(StatCategory::Block, StatDetail::GapSource);
                    let dependency = self
                        .ledger
                        .receive_source(txn.as_transaction(), &owned)
                        .unwrap_or_else(|| BlockHash::from(owned.link()));
                    let key = UncheckedKey::new(dependency, owned.hash());
                    let info = UncheckedInfo::new(
                        (*block).clone(),
                        owned.account_field().unwrap_or_default(),
                        seconds_since_epoch(),
                    );
                    let _ = self.ledger.store.unchecked().put(&mut *txn, &key, &info);
                    if source != BlockSource::Bootstrap {
                        self.gap_cache.add(owned.hash());
                    }
                }
                ProcessResult::Fork => {
                    self.stats.inc(StatCategory::Block, StatDetail::Fork);
                    for observer in self.fork_observers.lock().unwrap().iter() {
                        observer(&block);
                    }
                }
                ProcessResult::Old => {
                    self.stats.inc(StatCategory::Block, StatDetail::Old);
                }
                _ => {
                    self.stats.inc(StatCategory::Block, StatDetail::Invalid);
                    tracing::debug!(hash = %owned.hash(), code = ?result.code, "block rejected");
                }
            }
            results.push((result, block));
        }

        // Requeue anything that was waiting on a block we just accepted.
        for hash in &processed_hashes {
            let dependents = self.ledger.store.unchecked().get(txn.as_transaction(), hash);
            for info in dependents {
                let key = UncheckedKey::new(*hash, info.block.hash());
                let _ = self.ledger.store.unchecked().del(&mut *txn, &key);
                self.queues
                    .lock()
                    .unwrap()
                    .remote
                    .push_back((Arc::new(info.block), BlockSource::Unchecked));
            }
        }

        if let Err(error) = txn.commit() {
            tracing::error!(%error, "block batch commit failed");
            return Vec::new();
        }
        drop(guard);

        let observers = self.processed_observers.lock().unwrap();
        for (result, block) in &results {
            if result.code == ProcessResult::Progress {
                for observer in observers.iter() {
                    observer(result, block);
                }
            }
        }
        results
    }

    /// Keep draining until the queue is empty.
    pub fn flush(&self) -> usize {
        let mut total = 0;
        while self.queue_len() > 0 {
            let processed = self.process_batch().len();
            if processed == 0 {
                break;
            }
            total += processed;
        }
        total
    }
}

fn seconds_since_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_blocks::StateBlockBuilder;
    use lattica_crypto::KeyPair;
    use lattica_ledger::Genesis;
    use lattica_store::{Store, Table};
    use lattica_store_lmdb::{LmdbConfig, LmdbStore};
    use lattica_types::{Amount, Link, NetworkKind, NetworkParams, PublicKey, GENESIS_AMOUNT};

    struct Fixture {
        _dir: tempfile::TempDir,
        ledger: Arc<Ledger>,
        processor: BlockProcessor,
        genesis_key: KeyPair,
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
        let write_queue = Arc::new(WriteDatabaseQueue::new());
        let gap_cache = Arc::new(GapCache::new(Arc::clone(&ledger)));
        let processor = BlockProcessor::new(
            Arc::clone(&ledger),
            write_queue,
            gap_cache,
            Arc::new(Stats::new()),
        );
        Fixture {
            _dir: dir,
            ledger,
            processor,
            genesis_key: Genesis::new(NetworkKind::Test).key.unwrap(),
        }
    }

    fn work_for(ledger: &Ledger, root: lattica_types::Root) -> u64 {
        (0u64..)
            .find(|&w| lattica_work::difficulty::value(&root, w) >= ledger.params.work.base)
            .unwrap()
    }

    fn genesis_send(fx: &Fixture, previous: BlockHash, balance_after: u128) -> Arc<Block> {
        let mut block = StateBlockBuilder::new()
            .account(fx.genesis_key.public)
            .previous(previous)
            .representative(fx.genesis_key.public)
            .balance(Amount::raw(balance_after))
            .link(Link::from(PublicKey::new([9; 32])))
            .sign(&fx.genesis_key)
            .build()
            .unwrap();
        block.set_work(work_for(&fx.ledger, block.root()));
        Arc::new(block)
    }

    #[test]
    fn accepts_valid_block_and_notifies() {
        let fx = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        fx.processor
            .add_processed_observer(Box::new(move |_, block| {
                seen_clone.lock().unwrap().push(block.hash());
            }));

        let block = genesis_send(&fx, fx.ledger.genesis_hash(), GENESIS_AMOUNT - 1);
        assert!(fx.processor.add(Arc::clone(&block), BlockSource::Live));
        let results = fx.processor.process_batch();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.code, ProcessResult::Progress);
        assert_eq!(*seen.lock().unwrap(), vec![block.hash()]);

        // Stored block carries its sideband through to observers.
        assert!(results[0].1.sideband().is_some());
    }

    #[test]
    fn rejects_below_entry_work() {
        let fx = fixture();
        let mut weak = (*genesis_send(&fx, fx.ledger.genesis_hash(), GENESIS_AMOUNT - 1)).clone();
        let failing = (0u64..)
            .find(|&w| {
                lattica_work::difficulty::value(&weak.root(), w) < fx.ledger.params.work.entry
            })
            .unwrap();
        weak.set_work(failing);
        assert!(!fx.processor.add(Arc::new(weak), BlockSource::Live));
        assert_eq!(fx.processor.queue_len(), 0);
    }

    #[test]
    fn gap_parks_block_and_dependency_wakes_it() {
        let fx = fixture();
        let s1 = genesis_send(&fx, fx.ledger.genesis_hash(), GENESIS_AMOUNT - 1);
        let s2 = genesis_send(&fx, s1.hash(), GENESIS_AMOUNT - 2);

        // Child arrives first: parked as unchecked.
        fx.processor.add(Arc::clone(&s2), BlockSource::Live);
        let results = fx.processor.process_batch();
        assert_eq!(results[0].0.code, ProcessResult::GapPrevious);
        {
            let txn = fx.ledger.store.tx_begin_read();
            assert_eq!(fx.ledger.store.count(txn.as_transaction(), Table::Unchecked), 1);
        }

        // Parent arrives: both end up in the ledger.
        fx.processor.add(Arc::clone(&s1), BlockSource::Live);
        fx.processor.flush();
        let txn = fx.ledger.store.tx_begin_read();
        assert!(fx.ledger.block_exists(txn.as_transaction(), &s1.hash()));
        assert!(fx.ledger.block_exists(txn.as_transaction(), &s2.hash()));
        assert_eq!(fx.ledger.store.count(txn.as_transaction(), Table::Unchecked), 0);
    }

    #[test]
    fn fork_reported_to_observers() {
        let fx = fixture();
        let forks = Arc::new(Mutex::new(Vec::new()));
        let forks_clone = Arc::clone(&forks);
        fx.processor.add_fork_observer(Box::new(move |block| {
            forks_clone.lock().unwrap().push(block.hash());
        }));

        let a = genesis_send(&fx, fx.ledger.genesis_hash(), GENESIS_AMOUNT - 1);
        let b = genesis_send(&fx, fx.ledger.genesis_hash(), GENESIS_AMOUNT - 2);
        fx.processor.add(a, BlockSource::Live);
        fx.processor.add(Arc::clone(&b), BlockSource::Live);
        fx.processor.process_batch();
        assert_eq!(*forks.lock().unwrap(), vec![b.hash()]);
    }

    #[test]
    fn local_blocks_jump_the_queue() {
        let fx = fixture();
        let s1 = genesis_send(&fx, fx.ledger.genesis_hash(), GENESIS_AMOUNT - 1);
        let remote = genesis_send(&fx, s1.hash(), GENESIS_AMOUNT - 2);
        fx.processor.add(remote, BlockSource::Live);
        fx.processor.add(Arc::clone(&s1), BlockSource::Local);
        // Local s1 processes first, so the remote successor lands cleanly.
        let results = fx.processor.process_batch();
        assert_eq!(results[0].1.hash(), s1.hash());
        assert_eq!(results[0].0.code, ProcessResult::Progress);
        assert_eq!(results[1].0.code, ProcessResult::Progress);
    }

    #[test]
    fn duplicates_are_old() {
        let fx = fixture();
        let block = genesis_send(&fx, fx.ledger.genesis_hash(), GENESIS_AMOUNT - 1);
        fx.processor.add(Arc::clone(&block), BlockSource::Live);
        fx.processor.add(Arc::clone(&block), BlockSource::Live);
        let results = fx.processor.process_batch();
        assert_eq!(results[0].0.code, ProcessResult::Progress);
        assert_eq!(results[1].0.code, ProcessResult::Old);
    }
}
