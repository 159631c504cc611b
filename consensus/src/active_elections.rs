//! The bounded container of live elections.
//!
//! Elections are indexed by qualified root so fork candidates share one
//! election, and ordered by adjusted difficulty multiplier for eviction and
//! request prioritization. Dependency activation walks stalled elections
//! toward their account's cemented frontier, bisecting the gap so a long
//! unconfirmed chain costs O(log n) elections rather than O(n).

use crate::election::{
    Election, ElectionState, ElectionStatus, ElectionStatusType, ElectionVoteResult,
};
use crate::online_weight::OnlineReps;
use lattica_blocks::{Block, Vote};
use lattica_ledger::Ledger;
use lattica_store::{ReadTransaction, Store, Transaction};
use lattica_types::{Amount, BlockHash, PublicKey, QualifiedRoot};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Upper bound on blocks walked per dependency-activation pass.
const DEPENDENCY_WALK_MAX: u64 = 128;

/// Additive priority margin that keeps a dependency ranked above the
/// elections that wait on it.
const DEPENDENT_BOOST: f64 = 1.0 / 1024.0;

const RECENTLY_CONFIRMED_MAX: usize = 65_536;
const RECENTLY_CEMENTED_MAX: usize = 100;

/// Outcome of routing a whole vote into the container.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VoteCode {
    /// At least one election tallied the vote.
    Vote,
    /// Every referenced election had already seen this or a newer sequence.
    Replay,
    /// No referenced hash had a live election.
    Indeterminate,
    /// Bad signature; rejected before routing.
    Invalid,
}

#[derive(Clone, Copy, Debug)]
pub struct ElectionInsertResult {
    pub inserted: bool,
    pub existed: bool,
}

struct Inner {
    roots: HashMap<QualifiedRoot, Election>,
    /// Candidate hash → owning root.
    blocks: HashMap<BlockHash, QualifiedRoot>,
    recently_confirmed: VecDeque<(QualifiedRoot, BlockHash)>,
    recently_cemented: VecDeque<ElectionStatus>,
    /// Quorum winners awaiting cementation, drained by the node.
    confirmed_pending: Vec<ElectionStatus>,
}

pub struct ActiveElections {
    ledger: Arc<Ledger>,
    online: Arc<OnlineReps>,
    inner: Mutex<Inner>,
    max_size: usize,
}

impl ActiveElections {
    pub fn new(ledger: Arc<Ledger>, online: Arc<OnlineReps>) -> Self {
        let max_size = ledger.params.active_elections_size;
        Self {
            ledger,
            online,
            inner: Mutex::new(Inner {
                roots: HashMap::new(),
                blocks: HashMap::new(),
                recently_confirmed: VecDeque::new(),
                recently_cemented: VecDeque::new(),
                confirmed_pending: Vec::new(),
            }),
            max_size,
        }
    }

    /// Normalized difficulty multiplier of `block` against its threshold.
    fn block_multiplier(&self, block: &Block) -> f64 {
        let details = block
            .sideband()
            .map(|s| s.details)
            .unwrap_or_default();
        let threshold = self.ledger.params.work.threshold(&details);
        let difficulty = lattica_work::difficulty::value(&block.root(), block.work());
        let multiplier = lattica_work::to_multiplier(difficulty, threshold).max(1.0);
        lattica_work::normalized_multiplier(multiplier, threshold, &self.ledger.params.work)
    }

    fn dependents_of(&self, txn: &dyn Transaction, block: &Block) -> HashSet<BlockHash> {
        let mut dependents = HashSet::new();
        let previous = block.previous();
        if !previous.is_zero() {
            dependents.insert(previous);
        }
        if let Some(source) = self.ledger.receive_source(txn, block) {
            dependents.insert(source);
        }
        dependents
    }

    /// Start (or join) the election for `block`'s root.
    pub fn insert(&self, block: Arc<Block>) -> ElectionInsertResult {
        let txn = self.ledger.store.tx_begin_read();
        let mut inner = self.inner.lock().unwrap();
        self.insert_impl(txn.as_transaction(), &mut inner, block)
    }

    fn insert_impl(
        &self,
        txn: &dyn Transaction,
        inner: &mut Inner,
        block: Arc<Block>,
    ) -> ElectionInsertResult {
        let root = block.qualified_root();
        let hash = block.hash();
        if inner.roots.contains_key(&root) {
            return ElectionInsertResult {
                inserted: false,
                existed: true,
            };
        }
        if inner
            .recently_confirmed
            .iter()
            .any(|(confirmed_root, _)| *confirmed_root == root)
        {
            return ElectionInsertResult {
                inserted: false,
                existed: true,
            };
        }

        let multiplier = self.block_multiplier(&block);
        let dependents = self.dependents_of(txn, &block);
        let mut election = Election::new(block, multiplier, dependents);

        // A dependency inherits at least the priority of whoever waits on
        // it; and anything this election waits on gets pulled up too.
        for waiting in inner.roots.values() {
            if waiting.dependent_blocks.contains(&hash) {
                election.adjusted_multiplier = election
                    .adjusted_multiplier
                    .max(waiting.adjusted_multiplier + DEPENDENT_BOOST);
            }
        }
        let own_adjusted = election.adjusted_multiplier;
        let mut boost_targets: Vec<(BlockHash, f64)> = election
            .dependent_blocks
            .iter()
            .map(|dependency| (*dependency, own_adjusted + DEPENDENT_BOOST))
            .collect();
        let mut visited = HashSet::new();
        while let Some((dependency, floor)) = boost_targets.pop() {
            if !visited.insert(dependency) {
                continue;
            }
            let Some(dependency_root) = inner.blocks.get(&dependency).copied() else {
                continue;
            };
            if let Some(dependency_election) = inner.roots.get_mut(&dependency_root) {
                if dependency_election.adjusted_multiplier < floor {
                    dependency_election.adjusted_multiplier = floor;
                    for next in &dependency_election.dependent_blocks {
                        boost_targets.push((*next, floor + DEPENDENT_BOOST));
                    }
                }
            }
        }

        inner.blocks.insert(hash, root);
        inner.roots.insert(root, election);
        tracing::trace!(%hash, multiplier, "election started");

        if inner.roots.len() > self.max_size {
            self.evict_lowest(inner);
        }
        ElectionInsertResult {
            inserted: true,
            existed: false,
        }
    }

    /// Drop the lowest-priority unconfirmed election.
    fn evict_lowest(&self, inner: &mut Inner) {
        let victim = inner
            .roots
            .iter()
            .filter(|(_, election)| !election.state.is_confirmed())
            .min_by(|a, b| {
                a.1.adjusted_multiplier
                    .partial_cmp(&b.1.adjusted_multiplier)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(root, _)| *root);
        if let Some(root) = victim {
            tracing::debug!(%root, "evicting lowest-priority election");
            Self::erase_impl(inner, &root);
        }
    }

    fn erase_impl(inner: &mut Inner, root: &QualifiedRoot) -> Option<Election> {
        let election = inner.roots.remove(root)?;
        for hash in election.blocks.keys() {
            inner.blocks.remove(hash);
        }
        Some(election)
    }

    pub fn erase(&self, root: &QualifiedRoot) {
        let mut inner = self.inner.lock().unwrap();
        Self::erase_impl(&mut inner, root);
    }

    /// Route a verified vote. The caller has already checked the signature.
    pub fn vote(&self, vote: &Vote) -> VoteCode {
        let rep = vote.voting_account;
        let weight_ledger = Arc::clone(&self.ledger);
        let weight_of = move |key: &PublicKey| weight_ledger.weight(key);

        let mut processed = false;
        let mut replay = false;
        let mut recently = false;
        let mut confirmed_roots = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            for hash in vote.hashes() {
                if inner
                    .recently_confirmed
                    .iter()
                    .any(|(_, confirmed)| *confirmed == hash)
                {
                    recently = true;
                    continue;
                }
                let Some(root) = inner.blocks.get(&hash).copied() else {
                    continue;
                };
                let Some(election) = inner.roots.get_mut(&root) else {
                    continue;
                };
                if election.state.is_confirmed() {
                    replay = true;
                    continue;
                }
                match election.vote(rep, vote.sequence, hash) {
                    ElectionVoteResult::Processed => {
                        processed = true;
                        election.retally(&weight_of);
                        if self.have_quorum(election, &weight_of) {
                            confirmed_roots.push(root);
                        }
                    }
                    ElectionVoteResult::Replay => replay = true,
                }
            }
            for root in confirmed_roots {
                self.confirm_once(&mut inner, &root);
            }
        }

        if processed {
            VoteCode::Vote
        } else if replay || recently {
            VoteCode::Replay
        } else {
            VoteCode::Indeterminate
        }
    }

    fn have_quorum(&self, election: &Election, weight_of: &dyn Fn(&PublicKey) -> Amount) -> bool {
        let tally = election.tally(weight_of);
        let Some((winner_tally, _)) = tally.first() else {
            return false;
        };
        let runner_up = tally.get(1).map(|(sum, _)| *sum).unwrap_or(Amount::ZERO);
        let margin = winner_tally.saturating_sub(runner_up);
        *winner_tally > self.online.delta() && margin >= self.online.minimum_margin()
    }

    fn confirm_once(&self, inner: &mut Inner, root: &QualifiedRoot) {
        let Some(election) = inner.roots.get_mut(root) else {
            return;
        };
        if election.state.is_confirmed() {
            return;
        }
        election.transition(ElectionState::Confirmed);
        election.status.winner = election.winner_block();
        election.status.block_count = election.blocks.len() as u32;
        election.status.voter_count = election.last_votes.len() as u32;
        election.status.election_duration = election.age();
        election.status.confirmation_request_count = election.confirmation_request_count;
        election.status.status_type = ElectionStatusType::ActiveConfirmedQuorum;

        let winner = election.winner;
        let status = election.status.clone();
        tracing::debug!(hash = %winner, tally = %status.tally, "election confirmed");
        inner.recently_confirmed.push_back((*root, winner));
        if inner.recently_confirmed.len() > RECENTLY_CONFIRMED_MAX {
            inner.recently_confirmed.pop_front();
        }
        inner.confirmed_pending.push(status);
    }

    /// Winners that reached quorum since the last call; feed these to the
    /// confirmation-height processor.
    pub fn take_confirmed(&self) -> Vec<ElectionStatus> {
        std::mem::take(&mut self.inner.lock().unwrap().confirmed_pending)
    }

    /// Callback after a block is cemented: finalize and erase its election.
    pub fn block_cemented(&self, hash: &BlockHash) {
        let mut inner = self.inner.lock().unwrap();
        let Some(root) = inner.blocks.get(hash).copied() else {
            return;
        };
        let Some(election) = inner.roots.get_mut(&root) else {
            return;
        };
        if !election.state.is_confirmed() {
            // Cemented through a dependent election rather than own quorum.
            election.status.status_type = ElectionStatusType::ActiveConfirmationHeight;
            election.status.winner = election.blocks.get(hash).cloned();
        }
        let status = election.status.clone();
        inner.recently_cemented.push_back(status);
        if inner.recently_cemented.len() > RECENTLY_CEMENTED_MAX {
            inner.recently_cemented.pop_front();
        }
        Self::erase_impl(&mut inner, &root);
    }

    /// Register a fork candidate on an existing election.
    pub fn publish(&self, block: Arc<Block>) -> bool {
        let root = block.qualified_root();
        let hash = block.hash();
        let mut inner = self.inner.lock().unwrap();
        let Some(election) = inner.roots.get_mut(&root) else {
            return false;
        };
        if election.insert_block(Arc::clone(&block)) {
            inner.blocks.insert(hash, root);
            true
        } else {
            false
        }
    }

    /// A higher-difficulty rework of a known candidate replaces the stored
    /// work and bumps the election's priority. Lower difficulty is ignored.
    pub fn update_difficulty(&self, block: &Block) -> bool {
        let hash = block.hash();
        let multiplier = self.block_multiplier(block);
        let mut inner = self.inner.lock().unwrap();
        let Some(root) = inner.blocks.get(&hash).copied() else {
            return false;
        };
        let Some(election) = inner.roots.get_mut(&root) else {
            return false;
        };
        if multiplier <= election.multiplier {
            return false;
        }
        if let Some(existing) = election.blocks.get_mut(&hash) {
            let mut updated = (**existing).clone();
            updated.set_work(block.work());
            *existing = Arc::new(updated);
        }
        election.multiplier = multiplier;
        election.adjusted_multiplier = election.adjusted_multiplier.max(multiplier);
        tracing::trace!(%hash, multiplier, "election difficulty updated");
        true
    }

    // ── Introspection ────────────────────────────────────────────────────

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().roots.len()
    }

    pub fn active(&self, hash: &BlockHash) -> bool {
        self.inner.lock().unwrap().blocks.contains_key(hash)
    }

    pub fn active_root(&self, root: &QualifiedRoot) -> bool {
        self.inner.lock().unwrap().roots.contains_key(root)
    }

    pub fn recently_confirmed(&self, hash: &BlockHash) -> bool {
        self.inner
            .lock()
            .unwrap()
            .recently_confirmed
            .iter()
            .any(|(_, confirmed)| confirmed == hash)
    }

    pub fn recently_cemented(&self) -> Vec<ElectionStatus> {
        self.inner
            .lock()
            .unwrap()
            .recently_cemented
            .iter()
            .cloned()
            .collect()
    }

    /// Winner of the election containing `hash`, if any.
    pub fn winner_of(&self, hash: &BlockHash) -> Option<Arc<Block>> {
        let inner = self.inner.lock().unwrap();
        let root = inner.blocks.get(hash)?;
        inner.roots.get(root)?.winner_block()
    }

    /// Candidate hashes ordered by descending adjusted multiplier.
    pub fn roots_by_difficulty(&self) -> Vec<(f64, BlockHash)> {
        let inner = self.inner.lock().unwrap();
        let mut all: Vec<(f64, BlockHash)> = inner
            .roots
            .values()
            .map(|election| (election.adjusted_multiplier, election.winner))
            .collect();
        all.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        all
    }

    /// Trended multiplier over live elections; 1.0 when idle. Feeds work
    /// generation so local blocks outbid the active median.
    pub fn active_multiplier(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        if inner.roots.is_empty() {
            return 1.0;
        }
        let sum: f64 = inner
            .roots
            .values()
            .map(|election| election.multiplier)
            .sum();
        sum / inner.roots.len() as f64
    }

    /// The multiplier of the election for `hash`, if live.
    pub fn multiplier_of(&self, hash: &BlockHash) -> Option<f64> {
        let inner = self.inner.lock().unwrap();
        let root = inner.blocks.get(hash)?;
        inner.roots.get(root).map(|e| e.multiplier)
    }

    // ── Dependency activation ────────────────────────────────────────────

    /// One activation pass for the election containing `hash`. Returns the
    /// number of elections started.
    ///
    /// Pass one registers the immediate previous, the receive source and
    /// the cemented frontier's successor; each later pass bisects the
    /// remaining gap, walking at most [`DEPENDENCY_WALK_MAX`] blocks.
    pub fn activate_dependencies(&self, hash: &BlockHash) -> usize {
        let txn = self.ledger.store.tx_begin_read();
        let mut inner = self.inner.lock().unwrap();
        let Some(root) = inner.blocks.get(hash).copied() else {
            return 0;
        };
        let mut to_activate: Vec<Arc<Block>> = Vec::new();
        self.activation_pass(txn.as_transaction(), &mut inner, &root, &mut to_activate);

        let mut activated = 0;
        for block in to_activate {
            let result = self.insert_impl(txn.as_transaction(), &mut inner, block);
            if result.inserted {
                activated += 1;
            }
        }
        activated
    }

    fn activation_pass(
        &self,
        txn: &dyn Transaction,
        inner: &mut Inner,
        root: &QualifiedRoot,
        to_activate: &mut Vec<Arc<Block>>,
    ) {
        let Some(election) = inner.roots.get_mut(root) else {
            return;
        };
        if election.state.is_confirmed() {
            return;
        }
        let winner = election.winner;
        let Some(target) = self.ledger.block_get(txn, &winner) else {
            return;
        };
        let Some(sideband) = target.sideband().cloned() else {
            return;
        };
        let account = sideband.account;
        let confirmed = self
            .ledger
            .store
            .confirmation_height()
            .get(txn, &account)
            .unwrap_or_default();
        let lower_height = confirmed.height + 1;

        match election.activation_cursor {
            None => {
                // First pass: direct previous, receive source, and the
                // first uncemented block of the account.
                let previous = target.previous();
                if !previous.is_zero() && !self.ledger.block_confirmed(txn, &previous) {
                    if let Some(block) = self.ledger.block_get(txn, &previous) {
                        to_activate.push(Arc::new(block));
                    }
                }
                if let Some(source) = self.ledger.receive_source(txn, &target) {
                    if !self.ledger.block_confirmed(txn, &source) {
                        if let Some(block) = self.ledger.block_get(txn, &source) {
                            to_activate.push(Arc::new(block));
                        }
                    }
                }
                if lower_height < sideband.height {
                    if let Some(first_unconfirmed) =
                        self.first_uncemented(txn, &account, &confirmed.frontier)
                    {
                        to_activate.push(Arc::new(first_unconfirmed));
                    }
                }
                election.activation_cursor = Some((winner, sideband.height));
            }
            Some((cursor_hash, cursor_height)) => {
                if cursor_height <= lower_height {
                    return;
                }
                let bisect = lower_height + (cursor_height - lower_height) / 2;
                let next_height = bisect.max(cursor_height.saturating_sub(DEPENDENCY_WALK_MAX));
                if next_height >= cursor_height {
                    return;
                }
                let steps = cursor_height - next_height;
                if let Some(block) = self.walk_back(txn, &cursor_hash, steps) {
                    election.activation_cursor = Some((block.hash(), next_height));
                    to_activate.push(Arc::new(block));
                }
            }
        }
    }

    /// The first block above the cemented frontier; the account's open
    /// block when nothing is cemented yet.
    fn first_uncemented(
        &self,
        txn: &dyn Transaction,
        account: &PublicKey,
        frontier: &BlockHash,
    ) -> Option<Block> {
        if frontier.is_zero() {
            let info = self.ledger.store.accounts().get(txn, account)?;
            self.ledger.block_get(txn, &info.open_block)
        } else {
            let successor = self.ledger.store.blocks().successor(txn, frontier)?;
            self.ledger.block_get(txn, &successor)
        }
    }

    fn walk_back(&self, txn: &dyn Transaction, from: &BlockHash, steps: u64) -> Option<Block> {
        let mut current = self.ledger.block_get(txn, from)?;
        for _ in 0..steps {
            let previous = current.previous();
            if previous.is_zero() {
                return None;
            }
            current = self.ledger.block_get(txn, &previous)?;
        }
        Some(current)
    }

    // ── Lifecycle driving ────────────────────────────────────────────────

    /// Advance election states and collect the elections due a confirmation
    /// request this cycle, highest priority first.
    pub fn tick(&self) -> Vec<(QualifiedRoot, BlockHash)> {
        let base_latency =
            std::time::Duration::from_millis(self.ledger.params.request_interval_ms);
        let mut due = Vec::new();
        let mut expired = Vec::new();
        let mut stalled = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            let mut order: Vec<(f64, QualifiedRoot)> = inner
                .roots
                .iter()
                .map(|(root, election)| (election.adjusted_multiplier, *root))
                .collect();
            order.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

            for (_, root) in order {
                let Some(election) = inner.roots.get_mut(&root) else {
                    continue;
                };
                match election.state {
                    ElectionState::Idle => election.transition(ElectionState::Passive),
                    ElectionState::Passive => {
                        if election.time_in_state() >= base_latency * PASSIVE_DURATION_FACTOR {
                            election.transition(ElectionState::Active);
                        }
                    }
                    ElectionState::Active => {
                        due.push((root, election.winner));
                        election.confirmation_request_count += 1;
                        if election.confirmation_request_count >= ACTIVE_REQUEST_COUNT_MIN {
                            election.transition(ElectionState::Broadcasting);
                        }
                    }
                    ElectionState::Broadcasting => {
                        due.push((root, election.winner));
                        election.confirmation_request_count += 1;
                        if election.time_in_state() >= base_latency * BROADCAST_DURATION_FACTOR {
                            election.transition(ElectionState::Backtracking);
                        }
                    }
                    ElectionState::Backtracking => {
                        due.push((root, election.winner));
                        election.confirmation_request_count += 1;
                        stalled.push(election.winner);
                    }
                    ElectionState::Confirmed => {
                        if election.time_in_state() >= base_latency * CONFIRMED_DURATION_FACTOR {
                            election.transition(ElectionState::ExpiredConfirmed);
                            expired.push(root);
                        }
                    }
                    ElectionState::ExpiredConfirmed | ElectionState::ExpiredUnconfirmed => {
                        expired.push(root);
                    }
                }
                if !election.state.is_confirmed()
                    && election.age() >= base_latency * ELECTION_TTL_FACTOR
                {
                    election.transition(ElectionState::ExpiredUnconfirmed);
                    expired.push(root);
                }
            }
            for root in expired {
                Self::erase_impl(&mut inner, &root);
            }
        }
        // Stalled elections chase their dependencies.
        for hash in stalled {
            self.activate_dependencies(&hash);
        }
        due
    }
}

const PASSIVE_DURATION_FACTOR: u32 = 5;
const ACTIVE_REQUEST_COUNT_MIN: u32 = 2;
const BROADCAST_DURATION_FACTOR: u32 = 30;
const CONFIRMED_DURATION_FACTOR: u32 = 5;
const ELECTION_TTL_FACTOR: u32 = 600;
