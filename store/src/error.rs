//! Store failure taxonomy.

use thiserror::Error;

/// Distinguishes missing keys from genuine backend failures; `code` gives
/// the stable numeric discriminant surfaced on operator interfaces.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("value serialization failed: {0}")]
    Serialization(String),
    #[error("database schema version {found} is newer than supported version {supported}")]
    VersionMismatch { found: u64, supported: u64 },
    #[error("transaction already committed")]
    TransactionFinished,
}

impl StoreError {
    /// 0 reserved for success on foreign interfaces.
    pub fn code(&self) -> u32 {
        match self {
            StoreError::NotFound => 1,
            StoreError::Backend(_) => 2,
            StoreError::Serialization(_) => 3,
            StoreError::VersionMismatch { .. } => 4,
            StoreError::TransactionFinished => 5,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}
