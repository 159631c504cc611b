//! Proof-of-admission work.
//!
//! A block is admitted when `Blake2b(work ‖ root)` clears the threshold for
//! its epoch and subtype. The same value doubles as a priority signal during
//! contention, via the multiplier arithmetic in [`difficulty`].

pub mod difficulty;
pub mod pool;
pub mod validator;
mod xorshift;

pub use difficulty::{
    denormalized_multiplier, from_multiplier, normalized_multiplier, to_multiplier, value,
};
pub use pool::{WorkPool, WorkVersion};
pub use validator::{validate_block_work, validate_entry, work_threshold};

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WorkError {
    #[error("work generation cancelled")]
    Cancelled,
    #[error("work pool stopped")]
    Stopped,
}
