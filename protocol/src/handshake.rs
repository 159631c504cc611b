//! Node-id handshake signing.
//!
//! The cookie itself is issued and tracked by the network layer's syn
//! cookie table; these helpers cover the signing side: proving ownership
//! of a claimed node id by signing the peer's cookie.

use lattica_crypto::{sign_message, verify_message, KeyPair};
use lattica_types::{PublicKey, Signature};

/// Sign `cookie` with our node key, producing the handshake response.
pub fn respond_to_cookie(cookie: &[u8; 32], node_key: &KeyPair) -> (PublicKey, Signature) {
    (node_key.public, sign_message(cookie, &node_key.private))
}

/// Verify a peer's handshake response against the cookie we issued them.
pub fn verify_cookie_response(
    cookie: &[u8; 32],
    node_id: &PublicKey,
    signature: &Signature,
) -> bool {
    verify_message(cookie, signature, node_id)
}
