//! A single election: candidates, votes, tally and lifecycle.

use lattica_blocks::Block;
use lattica_types::{Amount, BlockHash, PublicKey, QualifiedRoot};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Alternative candidates an election will track before dropping forks.
pub const MAX_ELECTION_BLOCKS: usize = 10;

/// Lifecycle of an election.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ElectionState {
    /// Created, not yet picked up by the request loop.
    Idle,
    /// Known, tallied, but not yet soliciting votes.
    Passive,
    /// Soliciting confirmation requests.
    Active,
    /// Rebroadcasting the leading candidate.
    Broadcasting,
    /// Stalled without quorum; activating dependencies.
    Backtracking,
    /// Quorum reached; lingering for late votes.
    Confirmed,
    ExpiredConfirmed,
    ExpiredUnconfirmed,
}

impl ElectionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ElectionState::ExpiredConfirmed | ElectionState::ExpiredUnconfirmed
        )
    }

    pub fn is_confirmed(self) -> bool {
        matches!(
            self,
            ElectionState::Confirmed | ElectionState::ExpiredConfirmed
        )
    }
}

/// How an election (or non-election) confirmation concluded.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ElectionStatusType {
    Ongoing,
    ActiveConfirmedQuorum,
    ActiveConfirmationHeight,
    InactiveConfirmationHeight,
}

/// Snapshot of an election's outcome.
#[derive(Clone, Debug)]
pub struct ElectionStatus {
    pub winner: Option<Arc<Block>>,
    pub tally: Amount,
    pub block_count: u32,
    pub voter_count: u32,
    pub election_duration: Duration,
    pub confirmation_request_count: u32,
    pub status_type: ElectionStatusType,
}

impl Default for ElectionStatus {
    fn default() -> Self {
        Self {
            winner: None,
            tally: Amount::ZERO,
            block_count: 0,
            voter_count: 0,
            election_duration: Duration::ZERO,
            confirmation_request_count: 0,
            status_type: ElectionStatusType::Ongoing,
        }
    }
}

/// Latest vote seen from one representative.
#[derive(Clone, Debug)]
pub struct VoteInfo {
    pub sequence: u64,
    pub hash: BlockHash,
    pub time: Instant,
}

/// Outcome of applying one representative's vote to one election.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ElectionVoteResult {
    Processed,
    Replay,
}

pub struct Election {
    pub qualified_root: QualifiedRoot,
    pub state: ElectionState,
    state_start: Instant,
    election_start: Instant,
    /// Candidate blocks by hash; forks for the same root accumulate here.
    pub blocks: HashMap<BlockHash, Arc<Block>>,
    pub last_votes: HashMap<PublicKey, VoteInfo>,
    /// Hashes this election's candidates depend on (previous and source).
    pub dependent_blocks: HashSet<BlockHash>,
    /// Current leader; updated on tally.
    pub winner: BlockHash,
    /// Normalized difficulty multiplier of the strongest candidate.
    pub multiplier: f64,
    /// Multiplier after dependency boosting; the eviction/priority key.
    pub adjusted_multiplier: f64,
    pub confirmation_request_count: u32,
    pub status: ElectionStatus,
    /// Lowest ancestor height reached by dependency activation.
    pub activation_cursor: Option<(BlockHash, u64)>,
}

impl Election {
    pub fn new(block: Arc<Block>, multiplier: f64, dependents: HashSet<BlockHash>) -> Self {
        let hash = block.hash();
        let qualified_root = block.qualified_root();
        let mut blocks = HashMap::new();
        blocks.insert(hash, block);
        Self {
            qualified_root,
            state: ElectionState::Idle,
            state_start: Instant::now(),
            election_start: Instant::now(),
            blocks,
            last_votes: HashMap::new(),
            dependent_blocks: dependents,
            winner: hash,
            multiplier,
            adjusted_multiplier: multiplier,
            confirmation_request_count: 0,
            status: ElectionStatus::default(),
            activation_cursor: None,
        }
    }

    /// Register a fork candidate. Fails once the candidate cap is reached.
    pub fn insert_block(&mut self, block: Arc<Block>) -> bool {
        let hash = block.hash();
        if self.blocks.contains_key(&hash) {
            return true;
        }
        if self.blocks.len() >= MAX_ELECTION_BLOCKS {
            return false;
        }
        self.blocks.insert(hash, block);
        true
    }

    /// Apply a representative's vote for `hash`.
    ///
    /// Sequence numbers are monotonic per account within an election: an
    /// equal or lower sequence is a replay and changes nothing.
    pub fn vote(&mut self, rep: PublicKey, sequence: u64, hash: BlockHash) -> ElectionVoteResult {
        match self.last_votes.get(&rep) {
            Some(existing) if sequence <= existing.sequence => ElectionVoteResult::Replay,
            _ => {
                self.last_votes.insert(
                    rep,
                    VoteInfo {
                        sequence,
                        hash,
                        time: Instant::now(),
                    },
                );
                ElectionVoteResult::Processed
            }
        }
    }

    /// Sum representative weight per candidate, strongest first. Votes for
    /// hashes that are not (or no longer) candidates are ignored.
    pub fn tally(&self, weight_of: &dyn Fn(&PublicKey) -> Amount) -> Vec<(Amount, BlockHash)> {
        let mut sums: HashMap<BlockHash, Amount> = HashMap::new();
        for (rep, info) in &self.last_votes {
            if self.blocks.contains_key(&info.hash) {
                let entry = sums.entry(info.hash).or_insert(Amount::ZERO);
                *entry = entry.saturating_add(weight_of(rep));
            }
        }
        let mut sorted: Vec<(Amount, BlockHash)> =
            sums.into_iter().map(|(hash, sum)| (sum, hash)).collect();
        sorted.sort_by(|a, b| b.cmp(a));
        sorted
    }

    /// Re-rank the leader; returns true if the winner changed.
    pub fn retally(&mut self, weight_of: &dyn Fn(&PublicKey) -> Amount) -> bool {
        let tally = self.tally(weight_of);
        if let Some((sum, hash)) = tally.first() {
            self.status.tally = *sum;
            if *hash != self.winner {
                self.winner = *hash;
                return true;
            }
        }
        false
    }

    pub fn age(&self) -> Duration {
        self.election_start.elapsed()
    }

    pub fn time_in_state(&self) -> Duration {
        self.state_start.elapsed()
    }

    pub(crate) fn transition(&mut self, next: ElectionState) {
        debug_assert!(!self.state.is_terminal());
        self.state = next;
        self.state_start = Instant::now();
    }

    pub fn winner_block(&self) -> Option<Arc<Block>> {
        self.blocks.get(&self.winner).cloned()
    }
}
