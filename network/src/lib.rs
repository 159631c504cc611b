//! Core-facing network façade.
//!
//! Channels abstract the transport (UDP datagrams, TCP streams) behind one
//! send surface with explicit drop policies; the peer table, syn cookies
//! and bandwidth limiter implement admission and fairness; flood helpers
//! implement gossip with square-root fanout.

pub mod bandwidth_limiter;
pub mod channel;
pub mod network;
pub mod peer_table;
pub mod syn_cookies;

pub use bandwidth_limiter::BandwidthLimiter;
pub use channel::{Channel, ChannelKind, DropPolicy, TcpChannel, UdpChannel};
pub use network::Network;
pub use peer_table::{PeerEntry, PeerTable};
pub use syn_cookies::SynCookies;
