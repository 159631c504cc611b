//! Account epochs and per-block detail flags.
//!
//! Epochs gate protocol upgrades per account: an epoch block raises the
//! account's epoch without moving funds. The epoch also selects the
//! proof-of-work threshold a block must clear.

use crate::keys::{Link, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account upgrade generations, ordered.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum Epoch {
    /// Invalid marker for uninitialized sidebands.
    Invalid = 0,
    /// Original ledger rules.
    Epoch0 = 1,
    /// State blocks become canonical.
    Epoch1 = 2,
    /// Split work thresholds by subtype.
    Epoch2 = 3,
}

impl Epoch {
    pub const MAX: Epoch = Epoch::Epoch2;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Epoch> {
        match value {
            0 => Some(Epoch::Invalid),
            1 => Some(Epoch::Epoch0),
            2 => Some(Epoch::Epoch1),
            3 => Some(Epoch::Epoch2),
            _ => None,
        }
    }

    pub fn successor(self) -> Option<Epoch> {
        match self {
            Epoch::Epoch0 => Some(Epoch::Epoch1),
            Epoch::Epoch1 => Some(Epoch::Epoch2),
            _ => None,
        }
    }
}

/// Signer and link marker for one epoch generation.
#[derive(Clone, Copy, Debug)]
pub struct EpochInfo {
    pub signer: PublicKey,
    pub link: Link,
}

/// The network's table of epoch upgrades.
///
/// Each upgrade has a designated signer (usually the genesis key) and a
/// well-known link marker that identifies a state block as an epoch block.
#[derive(Clone, Debug, Default)]
pub struct Epochs {
    table: BTreeMap<Epoch, EpochInfo>,
}

impl Epochs {
    pub fn new() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, epoch: Epoch, signer: PublicKey, link: Link) {
        self.table.insert(epoch, EpochInfo { signer, link });
    }

    /// Whether `link` is any epoch marker.
    pub fn is_epoch_link(&self, link: &Link) -> bool {
        self.table.values().any(|info| info.link == *link)
    }

    /// The epoch a link marker upgrades to, if it is one.
    pub fn epoch(&self, link: &Link) -> Option<Epoch> {
        self.table
            .iter()
            .find(|(_, info)| info.link == *link)
            .map(|(epoch, _)| *epoch)
    }

    pub fn signer(&self, epoch: Epoch) -> Option<PublicKey> {
        self.table.get(&epoch).map(|info| info.signer)
    }

    pub fn link(&self, epoch: Epoch) -> Option<Link> {
        self.table.get(&epoch).map(|info| info.link)
    }

    /// Whether `next` directly follows `current`.
    pub fn is_sequential(current: Epoch, next: Epoch) -> bool {
        current.successor() == Some(next)
    }
}

/// Non-hashed flags recorded in a block's sideband after acceptance.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BlockDetails {
    pub epoch: Epoch,
    pub is_send: bool,
    pub is_receive: bool,
    pub is_epoch: bool,
}

impl BlockDetails {
    pub fn new(epoch: Epoch, is_send: bool, is_receive: bool, is_epoch: bool) -> Self {
        Self {
            epoch,
            is_send,
            is_receive,
            is_epoch,
        }
    }

    /// Packed single-byte form: epoch in the low 5 bits, flags above.
    pub fn pack(&self) -> u8 {
        let mut out = self.epoch.as_u8() & 0x1F;
        if self.is_send {
            out |= 1 << 5;
        }
        if self.is_receive {
            out |= 1 << 6;
        }
        if self.is_epoch {
            out |= 1 << 7;
        }
        out
    }

    pub fn unpack(byte: u8) -> Option<Self> {
        let epoch = Epoch::from_u8(byte & 0x1F)?;
        Some(Self {
            epoch,
            is_send: byte & (1 << 5) != 0,
            is_receive: byte & (1 << 6) != 0,
            is_epoch: byte & (1 << 7) != 0,
        })
    }
}

impl Default for BlockDetails {
    fn default() -> Self {
        Self::new(Epoch::Epoch0, false, false, false)
    }
}
