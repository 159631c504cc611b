//! 128-bit balance amounts.
//!
//! Amounts are raw integer units; there is no floating point anywhere in
//! balance arithmetic. The genesis account starts with `u128::MAX` raw.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// One Mlat, the customary display denomination.
pub const MLAT_RATIO: u128 = 1_000_000_000_000_000_000_000_000_000_000;

/// A 128-bit raw balance.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(u128::MAX);

    pub const fn raw(value: u128) -> Self {
        Self(value)
    }

    pub fn number(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Big-endian 16-byte wire form.
    pub fn to_be_bytes(&self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 16]) -> Self {
        Self(u128::from_be_bytes(bytes))
    }

    /// Parse the canonical decimal form.
    pub fn decode_dec(s: &str) -> Result<Self, ParseError> {
        if s.is_empty() || s.len() > 39 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidDecimal);
        }
        s.parse::<u128>().map(Self).map_err(|_| ParseError::InvalidDecimal)
    }

    /// Parse the 32-character hex form used on some interfaces.
    pub fn decode_hex(s: &str) -> Result<Self, ParseError> {
        if s.len() != 32 {
            return Err(ParseError::InvalidLength {
                expected: 32,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| ParseError::InvalidHex)?;
        Ok(Self(u128::from_be_bytes(bytes)))
    }

    pub fn encode_hex(&self) -> String {
        hex::encode_upper(self.0.to_be_bytes())
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_round_trip() {
        let a = Amount::raw(340_282_366_920_938_463_463);
        assert_eq!(Amount::decode_dec(&a.to_string()).unwrap(), a);
    }

    #[test]
    fn decimal_rejects_garbage() {
        assert!(Amount::decode_dec("").is_err());
        assert!(Amount::decode_dec("12a").is_err());
        assert!(Amount::decode_dec("-5").is_err());
        // one digit past the longest u128
        assert!(Amount::decode_dec(&"9".repeat(40)).is_err());
    }

    #[test]
    fn hex_round_trip() {
        let a = Amount::raw(0xDEADBEEF);
        assert_eq!(Amount::decode_hex(&a.encode_hex()).unwrap(), a);
    }

    #[test]
    fn max_decimal_parses() {
        let s = u128::MAX.to_string();
        assert_eq!(Amount::decode_dec(&s).unwrap(), Amount::MAX);
    }

    #[test]
    fn checked_arithmetic() {
        assert_eq!(Amount::MAX.checked_add(Amount::raw(1)), None);
        assert_eq!(Amount::ZERO.checked_sub(Amount::raw(1)), None);
        assert_eq!(
            Amount::raw(5).checked_sub(Amount::raw(3)),
            Some(Amount::raw(2))
        );
    }
}
