//! The ledger: validates and applies blocks, maintains representative
//! weights, enforces epoch transitions and rolls back forks.

pub mod genesis;
mod ledger;
pub mod rep_weights;

pub use genesis::Genesis;
pub use ledger::{Ledger, LedgerCache, ProcessResult, ProcessReturn, RollbackError};
pub use rep_weights::RepWeights;
