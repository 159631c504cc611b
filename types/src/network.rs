//! Network parameter set, fixed once at startup.
//!
//! A single `NetworkParams` value is constructed for the active network and
//! shared by reference everywhere. `set_active_network` may be called once
//! before the first `NetworkParams::default()`; afterwards the choice is
//! immutable for the process lifetime.

use crate::epoch::{BlockDetails, Epoch, Epochs};
use crate::keys::{Link, PublicKey};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Which network this node participates in.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    /// Production parameters, live ports.
    Live,
    /// Production-strength work, separate genesis and ports.
    Beta,
    /// Low work parameters, publicly known genesis key.
    Test,
}

impl NetworkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkKind::Live => "live",
            NetworkKind::Beta => "beta",
            NetworkKind::Test => "test",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "live" => Some(NetworkKind::Live),
            "beta" => Some(NetworkKind::Beta),
            "test" => Some(NetworkKind::Test),
            _ => None,
        }
    }

    /// Two-byte wire magic; the first byte is always `R`.
    pub fn magic(&self) -> [u8; 2] {
        match self {
            NetworkKind::Live => *b"RA",
            NetworkKind::Beta => *b"RB",
            NetworkKind::Test => *b"RX",
        }
    }
}

static ACTIVE_NETWORK: AtomicU8 = AtomicU8::new(2); // test by default in dev builds

/// Override the process-wide active network. Call once, before any
/// `NetworkParams::default()`.
pub fn set_active_network(kind: NetworkKind) {
    let value = match kind {
        NetworkKind::Live => 0,
        NetworkKind::Beta => 1,
        NetworkKind::Test => 2,
    };
    ACTIVE_NETWORK.store(value, Ordering::SeqCst);
}

pub fn active_network() -> NetworkKind {
    match ACTIVE_NETWORK.load(Ordering::SeqCst) {
        0 => NetworkKind::Live,
        1 => NetworkKind::Beta,
        _ => NetworkKind::Test,
    }
}

/// Per-epoch proof-of-work thresholds.
///
/// `base` is the hardest threshold and the reference point for multiplier
/// arithmetic; `entry` is the weakest and gates admission into the node
/// before block subtype is known.
#[derive(Clone, Copy, Debug)]
pub struct WorkThresholds {
    pub epoch_1: u64,
    pub epoch_2: u64,
    pub epoch_2_receive: u64,
    pub base: u64,
    pub entry: u64,
}

impl WorkThresholds {
    pub const fn new(epoch_1: u64, epoch_2: u64, epoch_2_receive: u64) -> Self {
        let mut base = epoch_1;
        if epoch_2 > base {
            base = epoch_2;
        }
        if epoch_2_receive > base {
            base = epoch_2_receive;
        }
        let mut entry = epoch_1;
        if epoch_2 < entry {
            entry = epoch_2;
        }
        if epoch_2_receive < entry {
            entry = epoch_2_receive;
        }
        Self {
            epoch_1,
            epoch_2,
            epoch_2_receive,
            base,
            entry,
        }
    }

    pub const fn publish_full() -> Self {
        Self::new(0xffffffc0_00000000, 0xfffffff8_00000000, 0xfffffe00_00000000)
    }

    pub const fn publish_beta() -> Self {
        Self::new(0xfffff00000000000, 0xfffff00000000000, 0xffffe00000000000)
    }

    pub const fn publish_test() -> Self {
        Self::new(0xff00000000000000, 0xff00000000000000, 0xff00000000000000)
    }

    /// The threshold a block with the given details must clear.
    ///
    /// Epoch 2 splits the bar: sends and changes pay the full price,
    /// receives, opens and epoch upgrades a lower one.
    pub fn threshold(&self, details: &BlockDetails) -> u64 {
        match details.epoch {
            Epoch::Epoch2 => {
                if details.is_receive || details.is_epoch {
                    self.epoch_2_receive
                } else {
                    self.epoch_2
                }
            }
            _ => self.epoch_1,
        }
    }
}

/// Everything parameterized by the network choice.
#[derive(Clone, Debug)]
pub struct NetworkParams {
    pub kind: NetworkKind,
    pub work: WorkThresholds,
    pub epochs: Epochs,
    /// Percent of online stake a winner must exceed to reach quorum.
    pub online_weight_quorum: u8,
    /// Floor for the online-stake estimate, in raw.
    pub online_weight_minimum: u128,
    /// A representative is principal above `online_stake / principal_weight_factor`.
    pub principal_weight_factor: u128,
    /// Base latency between election request cycles, in milliseconds.
    pub request_interval_ms: u64,
    pub default_node_port: u16,
    pub default_rpc_port: u16,
    pub default_websocket_port: u16,
    /// Uncemented backlog above which cementing switches to the bounded walker.
    pub confirmation_height_unbounded_cutoff: u64,
    /// Maximum concurrent elections before low-priority eviction.
    pub active_elections_size: usize,
}

impl NetworkParams {
    pub fn new(kind: NetworkKind) -> Self {
        let work = match kind {
            NetworkKind::Live => WorkThresholds::publish_full(),
            NetworkKind::Beta => WorkThresholds::publish_beta(),
            NetworkKind::Test => WorkThresholds::publish_test(),
        };
        let is_test = kind == NetworkKind::Test;
        Self {
            kind,
            work,
            epochs: Epochs::new(),
            online_weight_quorum: 50,
            online_weight_minimum: 60_000 * crate::amount::MLAT_RATIO,
            principal_weight_factor: 1000, // 0.1%
            request_interval_ms: if is_test { 20 } else { 500 },
            default_node_port: match kind {
                NetworkKind::Live => 7175,
                NetworkKind::Beta => 54100,
                NetworkKind::Test => 44100,
            },
            default_rpc_port: match kind {
                NetworkKind::Live => 7176,
                NetworkKind::Beta => 55100,
                NetworkKind::Test => 45100,
            },
            default_websocket_port: match kind {
                NetworkKind::Live => 7178,
                NetworkKind::Beta => 57100,
                NetworkKind::Test => 47100,
            },
            confirmation_height_unbounded_cutoff: 16_384,
            active_elections_size: if is_test { 50 } else { 50_000 },
        }
    }

    /// Register the standard epoch upgrades signed by `epoch_signer`.
    pub fn with_epochs(mut self, epoch_signer: PublicKey) -> Self {
        self.epochs
            .add(Epoch::Epoch1, epoch_signer, epoch_link(1));
        self.epochs
            .add(Epoch::Epoch2, epoch_signer, epoch_link(2));
        self
    }

    pub fn is_test(&self) -> bool {
        self.kind == NetworkKind::Test
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self::new(active_network())
    }
}

/// Well-known link marker for epoch `n`: ASCII banner padded with zeros,
/// generation number in the last byte.
pub fn epoch_link(n: u8) -> Link {
    let mut bytes = [0u8; 32];
    let banner = b"epoch v1 block";
    bytes[..banner.len()].copy_from_slice(banner);
    bytes[31] = n;
    Link::new(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_and_entry_derived() {
        let w = WorkThresholds::publish_full();
        assert_eq!(w.base, w.epoch_2);
        assert_eq!(w.entry, w.epoch_2_receive);
        assert!(w.base >= w.epoch_1 && w.epoch_1 >= w.entry);
    }

    #[test]
    fn epoch2_receive_is_cheaper() {
        let w = WorkThresholds::publish_full();
        let send = BlockDetails::new(Epoch::Epoch2, true, false, false);
        let receive = BlockDetails::new(Epoch::Epoch2, false, true, false);
        let upgrade = BlockDetails::new(Epoch::Epoch2, false, false, true);
        assert_eq!(w.threshold(&send), w.epoch_2);
        assert_eq!(w.threshold(&receive), w.epoch_2_receive);
        assert_eq!(w.threshold(&upgrade), w.epoch_2_receive);
        assert!(w.threshold(&send) > w.threshold(&receive));
    }

    #[test]
    fn epoch1_single_threshold() {
        let w = WorkThresholds::publish_full();
        let send = BlockDetails::new(Epoch::Epoch1, true, false, false);
        let receive = BlockDetails::new(Epoch::Epoch1, false, true, false);
        assert_eq!(w.threshold(&send), w.epoch_1);
        assert_eq!(w.threshold(&receive), w.epoch_1);
    }

    #[test]
    fn test_network_flat_thresholds() {
        let w = WorkThresholds::publish_test();
        assert_eq!(w.base, w.entry);
    }

    #[test]
    fn epoch_links_distinct() {
        assert_ne!(epoch_link(1), epoch_link(2));
        assert_eq!(epoch_link(1).as_bytes()[31], 1);
    }

    #[test]
    fn params_for_test_network() {
        let params = NetworkParams::new(NetworkKind::Test);
        assert_eq!(params.request_interval_ms, 20);
        assert_eq!(params.active_elections_size, 50);
        assert_eq!(params.online_weight_quorum, 50);
    }
}
