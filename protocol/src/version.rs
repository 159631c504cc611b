//! Protocol version constants.

/// Highest version this build speaks.
pub const PROTOCOL_VERSION_MAX: u8 = 18;
/// Version stamped on outgoing messages.
pub const PROTOCOL_VERSION_USING: u8 = 18;
/// Oldest peer version still accepted.
pub const PROTOCOL_VERSION_MIN: u8 = 16;
