//! Fundamental types for the Lattica protocol.
//!
//! Fixed-width numeric newtypes, epoch tables and the network parameter set
//! shared by every other crate. Nothing in here does I/O.

pub mod amount;
pub mod epoch;
pub mod error;
pub mod keys;
pub mod network;
pub mod time;

pub use amount::Amount;
pub use epoch::{BlockDetails, Epoch, EpochInfo, Epochs};
pub use error::ParseError;
pub use keys::{BlockHash, Link, PublicKey, QualifiedRoot, Root, Signature, WorkNonce};
pub use network::{active_network, set_active_network, NetworkKind, NetworkParams, WorkThresholds};
pub use time::Timestamp;

/// The total initial supply, assigned to the genesis account.
pub const GENESIS_AMOUNT: u128 = u128::MAX;

/// The burn account: funds sent to the all-zero public key are destroyed.
pub const BURN_ACCOUNT: PublicKey = PublicKey::ZERO;
