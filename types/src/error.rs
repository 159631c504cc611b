//! Parse failures for the textual codecs.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid length: expected {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("invalid hexadecimal digit")]
    InvalidHex,
    #[error("invalid decimal number")]
    InvalidDecimal,
    #[error("invalid account address")]
    InvalidAccount,
    #[error("invalid checksum")]
    InvalidChecksum,
}
