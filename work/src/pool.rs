//! Multi-threaded work generation.
//!
//! Workers race on the queue head with private nonce streams. A global
//! ticket counter is bumped whenever any worker finds a solution; peers
//! notice the mismatch at their next 256-nonce window boundary and abandon
//! the root without ever taking a lock on the hot path.

use crate::difficulty;
use crate::xorshift::XorShift1024Star;
use lattica_types::Root;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Nonces tried between ticket checks.
const BATCH_SIZE: usize = 256;

/// Work algorithm versions. Only one exists today; the enum keeps the wire
/// and threshold plumbing honest about versioning.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WorkVersion {
    Work1,
}

impl WorkVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkVersion::Work1 => "work_1",
        }
    }
}

type Callback = Box<dyn FnOnce(Option<u64>) + Send + 'static>;

/// Pluggable accelerator (e.g. a hardware generator) consulted by worker 0
/// before CPU search begins.
pub type ExternalGenerator =
    Box<dyn Fn(WorkVersion, &Root, u64) -> Option<u64> + Send + Sync + 'static>;

struct WorkItem {
    version: WorkVersion,
    root: Root,
    difficulty: u64,
    callback: Option<Callback>,
}

struct PoolState {
    queue: VecDeque<WorkItem>,
    done: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    producer_condition: Condvar,
    ticket: AtomicUsize,
    pow_rate_limiter: Duration,
    external: Option<ExternalGenerator>,
}

/// Producer/consumer pool searching for nonces that clear a threshold.
///
/// Callbacks fire in the order solutions are found, not enqueue order.
pub struct WorkPool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkPool {
    /// Spawn `max_threads` workers (clamped to at least one). A non-zero
    /// `pow_rate_limiter` inserts a sleep between nonce batches to cap CPU.
    pub fn new(
        max_threads: usize,
        pow_rate_limiter: Duration,
        external: Option<ExternalGenerator>,
    ) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                done: false,
            }),
            producer_condition: Condvar::new(),
            ticket: AtomicUsize::new(0),
            pow_rate_limiter,
            external,
        });
        let count = max_threads.max(1);
        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name("work".to_string())
                .spawn(move || worker_loop(shared, index))
                .expect("spawn work thread");
            threads.push(handle);
        }
        Self { shared, threads }
    }

    /// Enqueue a generation request; `callback` fires with the nonce, or
    /// `None` on cancellation or shutdown.
    pub fn generate_async(
        &self,
        version: WorkVersion,
        root: Root,
        difficulty: u64,
        callback: impl FnOnce(Option<u64>) + Send + 'static,
    ) {
        let mut state = self.shared.state.lock().unwrap();
        if state.done {
            drop(state);
            callback(None);
            return;
        }
        state.queue.push_back(WorkItem {
            version,
            root,
            difficulty,
            callback: Some(Box::new(callback)),
        });
        drop(state);
        self.shared.producer_condition.notify_all();
    }

    /// Block until a nonce is found or the request is cancelled.
    pub fn generate_blocking(
        &self,
        version: WorkVersion,
        root: Root,
        difficulty: u64,
    ) -> Option<u64> {
        let (tx, rx) = mpsc::channel();
        self.generate_async(version, root, difficulty, move |result| {
            let _ = tx.send(result);
        });
        rx.recv().ok().flatten()
    }

    /// Generate a nonce whose value lands in `[min_difficulty, max_difficulty)`.
    ///
    /// Retries past the upper bound; used by tests that need a difficulty
    /// window rather than a floor.
    pub fn generate_limited(
        &self,
        root: Root,
        min_difficulty: u64,
        max_difficulty: u64,
    ) -> Option<u64> {
        debug_assert!(min_difficulty < max_difficulty);
        loop {
            let work = self.generate_blocking(WorkVersion::Work1, root, min_difficulty)?;
            if difficulty::value(&root, work) < max_difficulty {
                return Some(work);
            }
        }
    }

    /// Evict `root` from the queue. The in-progress generator observes the
    /// ticket bump at its next window; every pending callback fires with
    /// `None`.
    pub fn cancel(&self, root: &Root) {
        let mut cancelled = Vec::new();
        {
            let mut state = self.shared.state.lock().unwrap();
            if let Some(front) = state.queue.front() {
                if front.root == *root {
                    self.shared.ticket.fetch_add(1, Ordering::Relaxed);
                }
            }
            let mut retained = VecDeque::with_capacity(state.queue.len());
            for mut item in state.queue.drain(..) {
                if item.root == *root {
                    if let Some(callback) = item.callback.take() {
                        cancelled.push(callback);
                    }
                } else {
                    retained.push_back(item);
                }
            }
            state.queue = retained;
        }
        for callback in cancelled {
            callback(None);
        }
    }

    /// Entries waiting in the queue.
    pub fn size(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }

    /// Shut down workers; queued requests receive `None`.
    pub fn stop(&mut self) {
        let mut pending = Vec::new();
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.done {
                return;
            }
            state.done = true;
            self.shared.ticket.fetch_add(1, Ordering::Relaxed);
            for mut item in state.queue.drain(..) {
                if let Some(callback) = item.callback.take() {
                    pending.push(callback);
                }
            }
        }
        self.shared.producer_condition.notify_all();
        for callback in pending {
            callback(None);
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<PoolShared>, thread_index: usize) {
    let mut rng = XorShift1024Star::seeded();
    let mut state = shared.state.lock().unwrap();
    loop {
        if state.done {
            break;
        }
        let Some(front) = state.queue.front() else {
            state = shared.producer_condition.wait(state).unwrap();
            continue;
        };
        let version = front.version;
        let root = front.root;
        let threshold = front.difficulty;
        let ticket = shared.ticket.load(Ordering::Relaxed);
        drop(state);

        let mut found: Option<u64> = None;

        // Worker 0 gives an external accelerator first refusal.
        if thread_index == 0 {
            if let Some(external) = &shared.external {
                if let Some(work) = external(version, &root, threshold) {
                    if difficulty::value(&root, work) >= threshold {
                        found = Some(work);
                    }
                }
            }
        }

        while found.is_none() && shared.ticket.load(Ordering::Relaxed) == ticket {
            for _ in 0..BATCH_SIZE {
                let work = rng.next();
                if difficulty::value(&root, work) >= threshold {
                    found = Some(work);
                    break;
                }
            }
            if found.is_none() && !shared.pow_rate_limiter.is_zero() {
                std::thread::sleep(shared.pow_rate_limiter);
            }
        }

        state = shared.state.lock().unwrap();
        if let Some(work) = found {
            // The lock serializes winners: only the first CAS succeeds, so
            // exactly one worker pops the item and fires its callback.
            if shared
                .ticket
                .compare_exchange(ticket, ticket + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                let matches = state
                    .queue
                    .front()
                    .map(|item| item.root == root)
                    .unwrap_or(false);
                if matches {
                    let mut item = state.queue.pop_front().unwrap();
                    drop(state);
                    if let Some(callback) = item.callback.take() {
                        callback(Some(work));
                    }
                    state = shared.state.lock().unwrap();
                }
            }
        }
    }
}
