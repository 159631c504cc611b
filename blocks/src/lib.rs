//! Chain entities: the five block variants, their sidebands and builders,
//! representative votes, and the weak-keyed uniquers that make identical
//! blocks and votes converge on one shared allocation.

pub mod block;
pub mod builder;
pub mod sideband;
pub mod uniquer;
pub mod vote;

pub use block::{
    Block, BlockType, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock, StateBlock,
};
pub use builder::{
    BlockBuildError, ChangeBlockBuilder, OpenBlockBuilder, ReceiveBlockBuilder, SendBlockBuilder,
    StateBlockBuilder,
};
pub use sideband::BlockSideband;
pub use uniquer::{BlockUniquer, VoteUniquer};
pub use vote::{Vote, VotePayload, MAX_VOTE_HASHES};
