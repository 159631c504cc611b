//! The full node: block processing pipeline, signature verification,
//! confirmation-height cementing, bootstrap and the node aggregate that
//! wires every subsystem together.

pub mod block_processor;
pub mod bootstrap;
pub mod config;
pub mod confirmation_height;
pub mod gap_cache;
pub mod node;
pub mod signature_checker;
pub mod state_block_verification;

pub use block_processor::{BlockProcessor, BlockSource};
pub use config::{DaemonConfig, NodeConfig};
pub use confirmation_height::ConfirmationHeightProcessor;
pub use gap_cache::GapCache;
pub use node::Node;
pub use signature_checker::SignatureChecker;
pub use state_block_verification::StateBlockVerification;
