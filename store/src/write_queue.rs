//! Serializes competing database writers by priority.
//!
//! The store forbids overlapping write transactions; this queue decides who
//! goes next. Cementing always outranks batch block processing, which
//! outranks pruning and vote persistence; the testing writer yields to
//! everything.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

/// Writer identities, highest priority first.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Writer {
    ConfirmationHeight,
    ProcessBatch,
    Pruning,
    Voting,
    Testing,
}

struct QueueState {
    waiting: VecDeque<(Writer, u64)>,
    next_token: u64,
}

/// Queue of pending writers; the front holds the write lock.
pub struct WriteDatabaseQueue {
    state: Mutex<QueueState>,
    condition: Condvar,
}

/// Releases the writer's slot on drop.
pub struct WriteGuard<'a> {
    queue: &'a WriteDatabaseQueue,
    writer: Writer,
    token: u64,
}

impl WriteGuard<'_> {
    pub fn writer(&self) -> Writer {
        self.writer
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.queue.release(self.token);
    }
}

impl WriteDatabaseQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                waiting: VecDeque::new(),
                next_token: 0,
            }),
            condition: Condvar::new(),
        }
    }

    /// Block until `writer` reaches the front of the queue.
    ///
    /// Higher-priority writers enqueue ahead of lower-priority waiters but
    /// never ahead of the current front, which already holds the lock.
    pub fn wait(&self, writer: Writer) -> WriteGuard<'_> {
        let mut state = self.state.lock().unwrap();
        let token = state.next_token;
        state.next_token += 1;
        let insert_at = state
            .waiting
            .iter()
            .enumerate()
            .skip(1) // never preempt the active writer
            .find(|(_, (waiting, _))| *waiting > writer)
            .map(|(index, _)| index)
            .unwrap_or(state.waiting.len());
        state.waiting.insert(insert_at, (writer, token));

        while state.waiting.front().map(|(_, t)| *t) != Some(token) {
            state = self.condition.wait(state).unwrap();
        }
        WriteGuard {
            queue: self,
            writer,
            token,
        }
    }

    /// Take the lock only if nothing is queued.
    pub fn try_lock(&self, writer: Writer) -> Option<WriteGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        if state.waiting.is_empty() {
            let token = state.next_token;
            state.next_token += 1;
            state.waiting.push_back((writer, token));
            Some(WriteGuard {
                queue: self,
                writer,
                token,
            })
        } else {
            None
        }
    }

    /// Whether `writer` currently holds or awaits the lock.
    pub fn contains(&self, writer: Writer) -> bool {
        self.state
            .lock()
            .unwrap()
            .waiting
            .iter()
            .any(|(w, _)| *w == writer)
    }

    fn release(&self, token: u64) {
        let mut state = self.state.lock().unwrap();
        if let Some(index) = state.waiting.iter().position(|(_, t)| *t == token) {
            state.waiting.remove(index);
        }
        drop(state);
        self.condition.notify_all();
    }
}

impl Default for WriteDatabaseQueue {
    fn default() -> Self {
        Self::new()
    }
}
