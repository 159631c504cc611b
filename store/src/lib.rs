//! Abstract storage traits for the Lattica protocol.
//!
//! Every backend (the LMDB B-tree store, the RocksDB LSM store, in-memory
//! stores in tests) implements these traits; the rest of the codebase
//! depends only on them. Iteration is expressed as visitor callbacks so the
//! traits stay object-safe across backends with very different cursor types.

pub mod account;
pub mod block;
pub mod confirmation_height;
pub mod error;
pub mod frontier;
pub mod meta;
pub mod online_weight;
pub mod peer;
pub mod pending;
pub mod transaction;
pub mod unchecked;
pub mod vote;
pub mod write_queue;

pub use account::{AccountInfo, AccountStore};
pub use block::BlockStore;
pub use confirmation_height::{ConfirmationHeightInfo, ConfirmationHeightStore};
pub use error::StoreError;
pub use frontier::FrontierStore;
pub use meta::{MetaStore, SCHEMA_VERSION, VERSION_KEY};
pub use online_weight::OnlineWeightStore;
pub use peer::{EndpointKey, PeerStore};
pub use pending::{PendingInfo, PendingKey, PendingStore};
pub use transaction::{ReadTransaction, Transaction, WriteTransaction};
pub use unchecked::{UncheckedInfo, UncheckedKey, UncheckedStore};
pub use vote::VoteStore;
pub use write_queue::{WriteDatabaseQueue, WriteGuard, Writer};

use lattica_blocks::Vote;
use lattica_crypto::RawKey;
use lattica_types::{BlockHash, PublicKey};
use std::path::Path;
use std::sync::Arc;

/// Logical tables of the ledger database.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Table {
    Frontiers,
    Accounts,
    Blocks,
    Pending,
    Unchecked,
    Vote,
    OnlineWeight,
    Peers,
    ConfirmationHeight,
    Meta,
}

impl Table {
    pub const ALL: [Table; 10] = [
        Table::Frontiers,
        Table::Accounts,
        Table::Blocks,
        Table::Pending,
        Table::Unchecked,
        Table::Vote,
        Table::OnlineWeight,
        Table::Peers,
        Table::ConfirmationHeight,
        Table::Meta,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Frontiers => "frontiers",
            Table::Accounts => "accounts",
            Table::Blocks => "blocks",
            Table::Pending => "pending",
            Table::Unchecked => "unchecked",
            Table::Vote => "vote",
            Table::OnlineWeight => "online_weight",
            Table::Peers => "peers",
            Table::ConfirmationHeight => "confirmation_height",
            Table::Meta => "meta",
        }
    }
}

/// The full ledger store: transactional access to every table.
///
/// A write transaction sees its own writes; iterators are stable within
/// their transaction. The store forbids overlapping write transactions,
/// enforced process-wide by [`WriteDatabaseQueue`].
pub trait Store: Send + Sync {
    fn tx_begin_read(&self) -> Box<dyn ReadTransaction>;
    fn tx_begin_write(&self) -> Box<dyn WriteTransaction>;

    fn accounts(&self) -> &dyn AccountStore;
    fn blocks(&self) -> &dyn BlockStore;
    fn pending(&self) -> &dyn PendingStore;
    fn frontiers(&self) -> &dyn FrontierStore;
    fn confirmation_height(&self) -> &dyn ConfirmationHeightStore;
    fn unchecked(&self) -> &dyn UncheckedStore;
    fn votes(&self) -> &dyn VoteStore;
    fn online_weight(&self) -> &dyn OnlineWeightStore;
    fn peers(&self) -> &dyn PeerStore;
    fn meta(&self) -> &dyn MetaStore;

    /// Entry count for `table`. O(1) on the LSM backend (cached), O(log n)
    /// on the B-tree backend.
    fn count(&self, txn: &dyn Transaction, table: Table) -> u64;

    /// Produce a compacted snapshot of the database at `destination`.
    fn copy_db(&self, destination: &Path) -> Result<(), StoreError>;

    /// Reconstruct secondary indices (frontiers) from the primary tables.
    fn rebuild_db(&self, txn: &mut dyn WriteTransaction) -> Result<(), StoreError>;

    /// Produce a signed vote for `hashes`, atomically bumping the stored
    /// sequence for `rep` so no two votes ever share one.
    fn vote_generate(
        &self,
        txn: &mut dyn WriteTransaction,
        rep: &PublicKey,
        prv: &RawKey,
        hashes: Vec<BlockHash>,
    ) -> Result<Arc<Vote>, StoreError> {
        let sequence = match self.votes().get(txn.as_transaction(), rep) {
            Some(existing) => existing.sequence + 1,
            None => 1,
        };
        let vote = Arc::new(Vote::new(*rep, prv, sequence, hashes));
        self.votes().put(txn, rep, &vote)?;
        Ok(vote)
    }
}
