//! Wire protocol: binary little-endian codec, node-id handshake helpers
//! and protocol version constants.

pub mod codec;
pub mod handshake;
pub mod version;

pub use codec::{deserialize_message, serialize_message, ProtocolError};
pub use handshake::{respond_to_cookie, verify_cookie_response};
pub use version::{PROTOCOL_VERSION_MAX, PROTOCOL_VERSION_MIN, PROTOCOL_VERSION_USING};
