//! Node-wide counters.
//!
//! Overflow, drop and throughput counters keyed by (category, detail).
//! Cheap enough to bump from hot paths; read back by telemetry and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StatCategory {
    Ledger,
    Block,
    Vote,
    ConfirmationHeight,
    Message,
    Drop,
    Bootstrap,
    Filter,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum StatDetail {
    All,
    Process,
    ProcessResult,
    Old,
    Gap,
    GapSource,
    Fork,
    Invalid,
    Replay,
    Indeterminate,
    Overflow,
    Cemented,
    Send,
    Receive,
    Publish,
    ConfirmReq,
    ConfirmAck,
    Keepalive,
    VoteGenerated,
    PullFinished,
    PullFailed,
    Duplicate,
}

/// Counter table. Counters appear on first use; the lock is held only for
/// the map lookup, the bump itself is atomic.
pub struct Stats {
    counters: Mutex<HashMap<(StatCategory, StatDetail), std::sync::Arc<AtomicU64>>>,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn counter(&self, category: StatCategory, detail: StatDetail) -> std::sync::Arc<AtomicU64> {
        let mut counters = self.counters.lock().unwrap();
        std::sync::Arc::clone(
            counters
                .entry((category, detail))
                .or_insert_with(|| std::sync::Arc::new(AtomicU64::new(0))),
        )
    }

    pub fn inc(&self, category: StatCategory, detail: StatDetail) {
        self.counter(category, detail).fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, category: StatCategory, detail: StatDetail, value: u64) {
        self.counter(category, detail)
            .fetch_add(value, Ordering::Relaxed);
    }

    pub fn count(&self, category: StatCategory, detail: StatDetail) -> u64 {
        self.counter(category, detail).load(Ordering::Relaxed)
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let stats = Stats::new();
        stats.inc(StatCategory::Vote, StatDetail::Replay);
        stats.inc(StatCategory::Vote, StatDetail::Replay);
        stats.add(StatCategory::Drop, StatDetail::Overflow, 5);
        assert_eq!(stats.count(StatCategory::Vote, StatDetail::Replay), 2);
        assert_eq!(stats.count(StatCategory::Drop, StatDetail::Overflow), 5);
        assert_eq!(stats.count(StatCategory::Ledger, StatDetail::All), 0);
    }
}
