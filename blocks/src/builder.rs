//! Per-variant block builders.
//!
//! A builder refuses to emit a block until every required field is set;
//! signing and work attachment are optional steps so unsigned test blocks
//! can be produced deliberately rather than by accident.

use crate::block::{Block, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock, StateBlock};
use lattica_crypto::{sign_message, KeyPair};
use lattica_types::{Amount, BlockHash, Link, PublicKey};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BlockBuildError {
    #[error("required field not set: {0}")]
    MissingField(&'static str),
}

macro_rules! require {
    ($field:expr, $name:literal) => {
        $field.ok_or(BlockBuildError::MissingField($name))?
    };
}

/// Builder for [`StateBlock`].
#[derive(Default)]
pub struct StateBlockBuilder {
    account: Option<PublicKey>,
    previous: Option<BlockHash>,
    representative: Option<PublicKey>,
    balance: Option<Amount>,
    link: Option<Link>,
    keypair: Option<KeyPair>,
    work: Option<u64>,
}

impl StateBlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(mut self, account: PublicKey) -> Self {
        self.account = Some(account);
        self
    }

    pub fn previous(mut self, previous: BlockHash) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn representative(mut self, representative: PublicKey) -> Self {
        self.representative = Some(representative);
        self
    }

    pub fn balance(mut self, balance: Amount) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn link(mut self, link: Link) -> Self {
        self.link = Some(link);
        self
    }

    /// Sign the finished block with `keypair`.
    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.keypair = Some(keypair.clone());
        self
    }

    pub fn work(mut self, work: u64) -> Self {
        self.work = Some(work);
        self
    }

    pub fn build(self) -> Result<Block, BlockBuildError> {
        let mut block = StateBlock::new(
            require!(self.account, "account"),
            require!(self.previous, "previous"),
            require!(self.representative, "representative"),
            require!(self.balance, "balance"),
            require!(self.link, "link"),
        );
        if let Some(keypair) = &self.keypair {
            block.signature = sign_message(block.hash().as_bytes(), &keypair.private);
        }
        if let Some(work) = self.work {
            block.work = work;
        }
        Ok(Block::State(block))
    }
}

/// Builder for [`SendBlock`].
#[derive(Default)]
pub struct SendBlockBuilder {
    previous: Option<BlockHash>,
    destination: Option<PublicKey>,
    balance: Option<Amount>,
    keypair: Option<KeyPair>,
    work: Option<u64>,
}

impl SendBlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(mut self, previous: BlockHash) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn destination(mut self, destination: PublicKey) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn balance(mut self, balance: Amount) -> Self {
        self.balance = Some(balance);
        self
    }

    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.keypair = Some(keypair.clone());
        self
    }

    pub fn work(mut self, work: u64) -> Self {
        self.work = Some(work);
        self
    }

    pub fn build(self) -> Result<Block, BlockBuildError> {
        let mut block = SendBlock::new(
            require!(self.previous, "previous"),
            require!(self.destination, "destination"),
            require!(self.balance, "balance"),
        );
        if let Some(keypair) = &self.keypair {
            block.signature = sign_message(block.hash().as_bytes(), &keypair.private);
        }
        if let Some(work) = self.work {
            block.work = work;
        }
        Ok(Block::Send(block))
    }
}

/// Builder for [`ReceiveBlock`].
#[derive(Default)]
pub struct ReceiveBlockBuilder {
    previous: Option<BlockHash>,
    source: Option<BlockHash>,
    keypair: Option<KeyPair>,
    work: Option<u64>,
}

impl ReceiveBlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(mut self, previous: BlockHash) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn source(mut self, source: BlockHash) -> Self {
        self.source = Some(source);
        self
    }

    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.keypair = Some(keypair.clone());
        self
    }

    pub fn work(mut self, work: u64) -> Self {
        self.work = Some(work);
        self
    }

    pub fn build(self) -> Result<Block, BlockBuildError> {
        let mut block = ReceiveBlock::new(
            require!(self.previous, "previous"),
            require!(self.source, "source"),
        );
        if let Some(keypair) = &self.keypair {
            block.signature = sign_message(block.hash().as_bytes(), &keypair.private);
        }
        if let Some(work) = self.work {
            block.work = work;
        }
        Ok(Block::Receive(block))
    }
}

/// Builder for [`OpenBlock`].
#[derive(Default)]
pub struct OpenBlockBuilder {
    source: Option<BlockHash>,
    representative: Option<PublicKey>,
    account: Option<PublicKey>,
    keypair: Option<KeyPair>,
    work: Option<u64>,
}

impl OpenBlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: BlockHash) -> Self {
        self.source = Some(source);
        self
    }

    pub fn representative(mut self, representative: PublicKey) -> Self {
        self.representative = Some(representative);
        self
    }

    pub fn account(mut self, account: PublicKey) -> Self {
        self.account = Some(account);
        self
    }

    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.keypair = Some(keypair.clone());
        self
    }

    pub fn work(mut self, work: u64) -> Self {
        self.work = Some(work);
        self
    }

    pub fn build(self) -> Result<Block, BlockBuildError> {
        let mut block = OpenBlock::new(
            require!(self.source, "source"),
            require!(self.representative, "representative"),
            require!(self.account, "account"),
        );
        if let Some(keypair) = &self.keypair {
            block.signature = sign_message(block.hash().as_bytes(), &keypair.private);
        }
        if let Some(work) = self.work {
            block.work = work;
        }
        Ok(Block::Open(block))
    }
}

/// Builder for [`ChangeBlock`].
#[derive(Default)]
pub struct ChangeBlockBuilder {
    previous: Option<BlockHash>,
    representative: Option<PublicKey>,
    keypair: Option<KeyPair>,
    work: Option<u64>,
}

impl ChangeBlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(mut self, previous: BlockHash) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn representative(mut self, representative: PublicKey) -> Self {
        self.representative = Some(representative);
        self
    }

    pub fn sign(mut self, keypair: &KeyPair) -> Self {
        self.keypair = Some(keypair.clone());
        self
    }

    pub fn work(mut self, work: u64) -> Self {
        self.work = Some(work);
        self
    }

    pub fn build(self) -> Result<Block, BlockBuildError> {
        let mut block = ChangeBlock::new(
            require!(self.previous, "previous"),
            require!(self.representative, "representative"),
        );
        if let Some(keypair) = &self.keypair {
            block.signature = sign_message(block.hash().as_bytes(), &keypair.private);
        }
        if let Some(work) = self.work {
            block.work = work;
        }
        Ok(Block::Change(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_crypto::verify_message;

    #[test]
    fn state_builder_requires_every_field() {
        let result = StateBlockBuilder::new()
            .account(PublicKey::new([1; 32]))
            .previous(BlockHash::ZERO)
            .representative(PublicKey::new([2; 32]))
            .balance(Amount::raw(10))
            .build();
        assert_eq!(result.unwrap_err(), BlockBuildError::MissingField("link"));
    }

    #[test]
    fn signed_block_verifies() {
        let keypair = KeyPair::from_seed([9; 32]);
        let block = StateBlockBuilder::new()
            .account(keypair.public)
            .previous(BlockHash::ZERO)
            .representative(keypair.public)
            .balance(Amount::raw(10))
            .link(Link::ZERO)
            .sign(&keypair)
            .work(777)
            .build()
            .unwrap();
        assert!(verify_message(
            block.hash().as_bytes(),
            &block.signature(),
            &keypair.public
        ));
        assert_eq!(block.work(), 777);
    }

    #[test]
    fn unsigned_build_is_deliberate() {
        let block = ChangeBlockBuilder::new()
            .previous(BlockHash::new([1; 32]))
            .representative(PublicKey::new([2; 32]))
            .build()
            .unwrap();
        assert!(block.signature().is_zero());
    }

    #[test]
    fn send_builder_missing_destination() {
        let result = SendBlockBuilder::new()
            .previous(BlockHash::new([1; 32]))
            .balance(Amount::ZERO)
            .build();
        assert_eq!(
            result.unwrap_err(),
            BlockBuildError::MissingField("destination")
        );
    }

    #[test]
    fn open_and_receive_builders() {
        let keypair = KeyPair::from_seed([1; 32]);
        let open = OpenBlockBuilder::new()
            .source(BlockHash::new([1; 32]))
            .representative(keypair.public)
            .account(keypair.public)
            .sign(&keypair)
            .build()
            .unwrap();
        let receive = ReceiveBlockBuilder::new()
            .previous(open.hash())
            .source(BlockHash::new([2; 32]))
            .sign(&keypair)
            .build()
            .unwrap();
        assert_eq!(receive.previous(), open.hash());
    }
}
