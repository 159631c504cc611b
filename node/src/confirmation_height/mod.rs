//! Confirmation-height processing.
//!
//! Two complementary cementers sit behind one queue. The unbounded walker
//! holds its whole plan in memory and is fastest while the uncemented
//! backlog is small; the bounded walker traverses in fixed-size chunks with
//! resumable checkpoints so an arbitrarily deep backlog cements in bounded
//! memory. Both guarantee: per-account heights only grow, a cemented
//! receive implies its source is cemented, and every cemented block is
//! observed exactly once, in topological order.

pub mod bounded;
pub mod unbounded;

use lattica_blocks::Block;
use lattica_ledger::Ledger;
use lattica_store::WriteDatabaseQueue;
use lattica_types::BlockHash;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Backlog size below which the unbounded walker is preferred.
pub const UNBOUNDED_CUTOFF: u64 = 16_384;

type CementedObserver = Box<dyn Fn(&Block) + Send + Sync>;

pub struct ConfirmationHeightProcessor {
    ledger: Arc<Ledger>,
    write_queue: Arc<WriteDatabaseQueue>,
    awaiting: Mutex<VecDeque<BlockHash>>,
    current: Mutex<Option<BlockHash>>,
    paused: AtomicBool,
    bounded: Mutex<bounded::BoundedProcessor>,
    observers: Mutex<Vec<CementedObserver>>,
}

impl ConfirmationHeightProcessor {
    pub fn new(ledger: Arc<Ledger>, write_queue: Arc<WriteDatabaseQueue>) -> Self {
        Self {
            bounded: Mutex::new(bounded::BoundedProcessor::new(Arc::clone(&ledger))),
            ledger,
            write_queue,
            awaiting: Mutex::new(VecDeque::new()),
            current: Mutex::new(None),
            paused: AtomicBool::new(false),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register a cemented-block observer; invoked once per cemented block
    /// in ledger-topological order.
    pub fn add_cemented_observer(&self, observer: CementedObserver) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Queue `hash` for cementing.
    pub fn add(&self, hash: BlockHash) {
        self.awaiting.lock().unwrap().push_back(hash);
    }

    pub fn awaiting_processing_size(&self) -> usize {
        self.awaiting.lock().unwrap().len()
    }

    pub fn is_processing_block(&self, hash: &BlockHash) -> bool {
        if self.current.lock().unwrap().as_ref() == Some(hash) {
            return true;
        }
        self.awaiting.lock().unwrap().iter().any(|h| h == hash)
    }

    /// Halt new work; the in-flight batch completes. Test hook.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn unpause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Process one queued hash. Returns the cemented blocks, observer
    /// callbacks already fired.
    pub fn run_once(&self) -> Vec<Block> {
        if self.paused.load(Ordering::SeqCst) {
            return Vec::new();
        }
        let Some(hash) = self.awaiting.lock().unwrap().pop_front() else {
            return Vec::new();
        };
        *self.current.lock().unwrap() = Some(hash);

        let uncemented = {
            let block_count = self
                .ledger
                .cache
                .block_count
                .load(Ordering::Relaxed);
            let cemented = self
                .ledger
                .cache
                .cemented_count
                .load(Ordering::Relaxed);
            block_count.saturating_sub(cemented)
        };

        let mut bounded = self.bounded.lock().unwrap();
        let cemented = if uncemented < UNBOUNDED_CUTOFF && !bounded.pending_writes() {
            unbounded::cement(&self.ledger, &self.write_queue, &hash)
        } else {
            bounded.process(&self.write_queue, &hash)
        };
        drop(bounded);

        self.ledger
            .cache
            .cemented_count
            .fetch_add(cemented.len() as u64, Ordering::Relaxed);

        let observers = self.observers.lock().unwrap();
        for block in &cemented {
            for observer in observers.iter() {
                observer(block);
            }
        }
        drop(observers);

        *self.current.lock().unwrap() = None;
        cemented
    }

    /// Drain the whole queue.
    pub fn flush(&self) -> Vec<Block> {
        let mut all = Vec::new();
        while self.awaiting_processing_size() > 0 {
            if self.paused.load(Ordering::SeqCst) {
                break;
            }
            all.extend(self.run_once());
        }
        all
    }
}
