//! Local vote generation.
//!
//! Confirmation hashes are coalesced into votes of up to twelve hashes,
//! emitted after a short delay or once enough accumulate. Each vote is
//! signed by every local representative through `Store::vote_generate`,
//! which atomically bumps the persisted sequence.

use lattica_blocks::{Vote, MAX_VOTE_HASHES};
use lattica_crypto::KeyPair;
use lattica_ledger::Ledger;
use lattica_store::{Store, WriteDatabaseQueue, WriteTransaction, Writer};
use lattica_types::{BlockHash, Root};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Wait this long for more hashes before emitting a partial vote.
pub const VOTE_GENERATOR_DELAY: Duration = Duration::from_millis(100);

/// Emit immediately once this many hashes are queued.
pub const VOTE_GENERATOR_THRESHOLD: usize = 3;

type VoteSink = Box<dyn Fn(Arc<Vote>) + Send + Sync>;

struct Queue {
    hashes: VecDeque<(Root, BlockHash)>,
    last_broadcast: Instant,
}

pub struct VoteGenerator {
    ledger: Arc<Ledger>,
    write_queue: Arc<WriteDatabaseQueue>,
    representatives: Mutex<Vec<KeyPair>>,
    queue: Mutex<Queue>,
    sink: VoteSink,
}

impl VoteGenerator {
    pub fn new(
        ledger: Arc<Ledger>,
        write_queue: Arc<WriteDatabaseQueue>,
        sink: VoteSink,
    ) -> Self {
        Self {
            ledger,
            write_queue,
            representatives: Mutex::new(Vec::new()),
            queue: Mutex::new(Queue {
                hashes: VecDeque::new(),
                last_broadcast: Instant::now(),
            }),
            sink,
        }
    }

    /// Register a local representative key able to vote.
    pub fn add_representative(&self, key: KeyPair) {
        self.representatives.lock().unwrap().push(key);
    }

    pub fn representative_count(&self) -> usize {
        self.representatives.lock().unwrap().len()
    }

    /// Queue a confirmed (root, hash) for voting; emits immediately when
    /// the accumulation threshold is met.
    pub fn add(&self, root: Root, hash: BlockHash) {
        let should_emit = {
            let mut queue = self.queue.lock().unwrap();
            if queue.hashes.iter().any(|(_, queued)| *queued == hash) {
                return;
            }
            queue.hashes.push_back((root, hash));
            queue.hashes.len() >= VOTE_GENERATOR_THRESHOLD
        };
        if should_emit {
            self.broadcast();
        }
    }

    /// Timer tick: emit a partial batch once the delay has passed.
    pub fn run_once(&self) {
        let due = {
            let queue = self.queue.lock().unwrap();
            !queue.hashes.is_empty() && queue.last_broadcast.elapsed() >= VOTE_GENERATOR_DELAY
        };
        if due {
            self.broadcast();
        }
    }

    /// Sign and emit everything queued, in wire-sized chunks. Returns the
    /// number of votes sent (batches × representatives).
    pub fn broadcast(&self) -> usize {
        let batch: Vec<(Root, BlockHash)> = {
            let mut queue = self.queue.lock().unwrap();
            queue.last_broadcast = Instant::now();
            queue.hashes.drain(..).collect()
        };
        if batch.is_empty() {
            return 0;
        }
        let representatives = self.representatives.lock().unwrap().clone();
        if representatives.is_empty() {
            return 0;
        }

        let mut sent = 0;
        let _guard = self.write_queue.wait(Writer::Voting);
        let mut txn = self.ledger.store.tx_begin_write();
        for chunk in batch.chunks(MAX_VOTE_HASHES) {
            let hashes: Vec<BlockHash> = chunk.iter().map(|(_, hash)| *hash).collect();
            for rep in &representatives {
                match self
                    .ledger
                    .store
                    .vote_generate(&mut *txn, &rep.public, &rep.private, hashes.clone())
                {
                    Ok(vote) => {
                        (self.sink)(vote);
                        sent += 1;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "vote generation failed");
                    }
                }
            }
        }
        if let Err(error) = txn.commit() {
            tracing::warn!(%error, "vote sequence commit failed");
        }
        sent
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().unwrap().hashes.len()
    }
}
