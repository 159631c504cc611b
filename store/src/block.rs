//! Block table: hash → type byte ‖ block bytes ‖ sideband bytes.

use crate::transaction::{Transaction, WriteTransaction};
use crate::StoreError;
use lattica_blocks::{Block, BlockSideband, BlockType};
use lattica_types::{BlockHash, PublicKey};

/// Encode a block and its sideband in the storage layout.
pub fn entry_bytes(block: &Block) -> Result<Vec<u8>, StoreError> {
    let sideband = block
        .sideband()
        .ok_or_else(|| StoreError::Serialization("block stored without sideband".into()))?;
    let mut out = Vec::with_capacity(1 + block.block_type().size() + BlockSideband::SIZE);
    block.serialize_with_type(&mut out);
    sideband.serialize(&mut out);
    Ok(out)
}

/// Decode the storage layout back to a block with its sideband attached.
pub fn entry_from_bytes(bytes: &[u8]) -> Option<Block> {
    let (&type_byte, rest) = bytes.split_first()?;
    let block_type = BlockType::from_u8(type_byte)?;
    let body_size = block_type.size();
    if rest.len() != body_size + BlockSideband::SIZE {
        return None;
    }
    let mut block = Block::deserialize(block_type, &rest[..body_size])?;
    let sideband = BlockSideband::deserialize(&rest[body_size..])?;
    block.set_sideband(sideband);
    Some(block)
}

pub trait BlockStore: Send + Sync {
    /// Store `block`, which must carry a sideband.
    fn put(&self, txn: &mut dyn WriteTransaction, block: &Block) -> Result<(), StoreError>;

    /// Fetch a block with its sideband attached.
    fn get(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<Block>;

    fn del(&self, txn: &mut dyn WriteTransaction, hash: &BlockHash) -> Result<(), StoreError>;

    fn exists(&self, txn: &dyn Transaction, hash: &BlockHash) -> bool {
        self.get(txn, hash).is_some()
    }

    /// The next block in the chain, from the sideband; `None` at a frontier.
    fn successor(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<BlockHash> {
        let block = self.get(txn, hash)?;
        let successor = block.sideband()?.successor;
        (!successor.is_zero()).then_some(successor)
    }

    /// Rewrite the stored sideband's successor pointer.
    fn successor_set(
        &self,
        txn: &mut dyn WriteTransaction,
        hash: &BlockHash,
        successor: BlockHash,
    ) -> Result<(), StoreError>;

    /// The account a block belongs to. Falls back to walking the chain when
    /// an entry predates sidebands (only reachable during store upgrades).
    fn account_computed(&self, txn: &dyn Transaction, hash: &BlockHash) -> Option<PublicKey> {
        let block = self.get(txn, hash)?;
        if let Some(sideband) = block.sideband() {
            if !sideband.account.is_zero() {
                return Some(sideband.account);
            }
        }
        block.account_field()
    }

    fn for_each(&self, txn: &dyn Transaction, f: &mut dyn FnMut(&BlockHash, &Block) -> bool);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattica_blocks::StateBlockBuilder;
    use lattica_types::{Amount, BlockDetails, Epoch, Link};

    #[test]
    fn entry_round_trip() {
        let mut block = StateBlockBuilder::new()
            .account(PublicKey::new([1; 32]))
            .previous(BlockHash::new([2; 32]))
            .representative(PublicKey::new([3; 32]))
            .balance(Amount::raw(500))
            .link(Link::ZERO)
            .build()
            .unwrap();
        block.set_sideband(BlockSideband::new(
            BlockHash::ZERO,
            PublicKey::new([1; 32]),
            Amount::raw(500),
            3,
            1_650_000_000,
            BlockDetails::new(Epoch::Epoch2, true, false, false),
            Epoch::Invalid,
        ));
        let bytes = entry_bytes(&block).unwrap();
        let decoded = entry_from_bytes(&bytes).unwrap();
        assert_eq!(decoded.hash(), block.hash());
        assert_eq!(decoded.sideband(), block.sideband());
    }

    #[test]
    fn entry_requires_sideband() {
        let block = StateBlockBuilder::new()
            .account(PublicKey::new([1; 32]))
            .previous(BlockHash::ZERO)
            .representative(PublicKey::new([3; 32]))
            .balance(Amount::raw(1))
            .link(Link::ZERO)
            .build()
            .unwrap();
        assert!(entry_bytes(&block).is_err());
    }

    #[test]
    fn malformed_entry_rejected() {
        assert!(entry_from_bytes(&[]).is_none());
        assert!(entry_from_bytes(&[6, 0, 0]).is_none());
    }
}
