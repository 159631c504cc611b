//! Checksummed `lat_` account addresses.
//!
//! An address encodes 4 zero bits + the 256-bit public key in 52 base-32
//! characters, followed by a 40-bit Blake2b checksum (byte-reversed) in 8
//! more. The alphabet omits visually ambiguous characters.

use crate::hash::blake2b_var;
use lattica_types::{ParseError, PublicKey};

const PREFIX: &str = "lat_";
const ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";

fn char_value(c: u8) -> Option<u8> {
    ALPHABET.iter().position(|&a| a == c).map(|i| i as u8)
}

fn encode_bits(bits: &[bool], out: &mut String) {
    debug_assert_eq!(bits.len() % 5, 0);
    for chunk in bits.chunks(5) {
        let mut value = 0u8;
        for &bit in chunk {
            value = (value << 1) | bit as u8;
        }
        out.push(ALPHABET[value as usize] as char);
    }
}

fn bytes_to_bits(bytes: &[u8], bits: &mut Vec<bool>) {
    for &byte in bytes {
        for i in (0..8).rev() {
            bits.push(byte & (1 << i) != 0);
        }
    }
}

/// Encode a public key as a `lat_` address.
pub fn encode_account(key: &PublicKey) -> String {
    let mut out = String::with_capacity(PREFIX.len() + 60);
    out.push_str(PREFIX);

    let mut bits = Vec::with_capacity(260);
    bits.extend([false; 4]);
    bytes_to_bits(key.as_bytes(), &mut bits);
    encode_bits(&bits, &mut out);

    let checksum = blake2b_var(5, key.as_bytes());
    let mut check_bits = Vec::with_capacity(40);
    let reversed: Vec<u8> = checksum.iter().rev().copied().collect();
    bytes_to_bits(&reversed, &mut check_bits);
    encode_bits(&check_bits, &mut out);

    out
}

/// Decode a `lat_` address back to a public key, verifying the checksum.
pub fn decode_account(address: &str) -> Result<PublicKey, ParseError> {
    let body = address
        .strip_prefix(PREFIX)
        .ok_or(ParseError::InvalidAccount)?;
    if body.len() != 60 {
        return Err(ParseError::InvalidLength {
            expected: 60,
            actual: body.len(),
        });
    }

    let mut bits = Vec::with_capacity(300);
    for c in body.bytes() {
        let value = char_value(c).ok_or(ParseError::InvalidAccount)?;
        for i in (0..5).rev() {
            bits.push(value & (1 << i) != 0);
        }
    }

    // 4 pad + 256 key + 40 checksum
    if bits[..4].iter().any(|&b| b) {
        return Err(ParseError::InvalidAccount);
    }
    let mut key_bytes = [0u8; 32];
    for (i, chunk) in bits[4..260].chunks(8).enumerate() {
        let mut byte = 0u8;
        for &bit in chunk {
            byte = (byte << 1) | bit as u8;
        }
        key_bytes[i] = byte;
    }
    let mut check_bytes = [0u8; 5];
    for (i, chunk) in bits[260..].chunks(8).enumerate() {
        let mut byte = 0u8;
        for &bit in chunk {
            byte = (byte << 1) | bit as u8;
        }
        check_bytes[i] = byte;
    }

    let key = PublicKey::new(key_bytes);
    let expected = blake2b_var(5, key.as_bytes());
    let expected_reversed: Vec<u8> = expected.iter().rev().copied().collect();
    if check_bytes != expected_reversed[..] {
        return Err(ParseError::InvalidChecksum);
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let key = PublicKey::new([0xC3; 32]);
        let address = encode_account(&key);
        assert!(address.starts_with("lat_"));
        assert_eq!(address.len(), 64);
        assert_eq!(decode_account(&address).unwrap(), key);
    }

    #[test]
    fn zero_key_round_trip() {
        let key = PublicKey::ZERO;
        assert_eq!(decode_account(&encode_account(&key)).unwrap(), key);
    }

    #[test]
    fn corrupted_checksum_rejected() {
        let address = encode_account(&PublicKey::new([9; 32]));
        let mut broken = address.clone().into_bytes();
        let last = broken.len() - 1;
        broken[last] = if broken[last] == b'1' { b'3' } else { b'1' };
        let broken = String::from_utf8(broken).unwrap();
        assert!(matches!(
            decode_account(&broken),
            Err(ParseError::InvalidChecksum) | Err(ParseError::InvalidAccount)
        ));
    }

    #[test]
    fn wrong_prefix_rejected() {
        let address = encode_account(&PublicKey::new([9; 32]));
        let wrong = address.replacen("lat_", "xat_", 1);
        assert_eq!(decode_account(&wrong), Err(ParseError::InvalidAccount));
    }

    #[test]
    fn truncated_rejected() {
        let address = encode_account(&PublicKey::new([9; 32]));
        assert!(decode_account(&address[..address.len() - 1]).is_err());
    }

    #[test]
    fn distinct_keys_distinct_addresses() {
        assert_ne!(
            encode_account(&PublicKey::new([1; 32])),
            encode_account(&PublicKey::new([2; 32]))
        );
    }
}
