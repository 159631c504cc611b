//! Post-acceptance block metadata.
//!
//! The sideband is written by the ledger when a block is accepted and
//! stored alongside the block bytes. It is never hashed or signed.

use lattica_types::{Amount, BlockDetails, BlockHash, Epoch, PublicKey};

/// Successor pointer, owning account and chain statistics for a stored block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSideband {
    /// The next block in the account chain; zero at the frontier.
    pub successor: BlockHash,
    /// The account that owns the chain this block sits on.
    pub account: PublicKey,
    /// Balance of the account as of this block.
    pub balance: Amount,
    /// 1-based height in the account chain.
    pub height: u64,
    /// Local wall-clock seconds when the block was accepted.
    pub timestamp: u64,
    pub details: BlockDetails,
    /// Epoch of the source send, for receives; `Invalid` otherwise.
    pub source_epoch: Epoch,
}

impl BlockSideband {
    pub const SIZE: usize = 32 + 32 + 16 + 8 + 8 + 1 + 1;

    pub fn new(
        successor: BlockHash,
        account: PublicKey,
        balance: Amount,
        height: u64,
        timestamp: u64,
        details: BlockDetails,
        source_epoch: Epoch,
    ) -> Self {
        Self {
            successor,
            account,
            balance,
            height,
            timestamp,
            details,
            source_epoch,
        }
    }

    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.successor.as_bytes());
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(&self.balance.to_be_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out.push(self.details.pack());
        out.push(self.source_epoch.as_u8());
    }

    pub fn deserialize(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::SIZE {
            return None;
        }
        let successor = BlockHash::new(bytes[0..32].try_into().unwrap());
        let account = PublicKey::new(bytes[32..64].try_into().unwrap());
        let balance = Amount::from_be_bytes(bytes[64..80].try_into().unwrap());
        let height = u64::from_le_bytes(bytes[80..88].try_into().unwrap());
        let timestamp = u64::from_le_bytes(bytes[88..96].try_into().unwrap());
        let details = BlockDetails::unpack(bytes[96])?;
        let source_epoch = Epoch::from_u8(bytes[97])?;
        Some(Self {
            successor,
            account,
            balance,
            height,
            timestamp,
            details,
            source_epoch,
        })
    }
}
