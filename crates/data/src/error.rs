//! Unified error handling for the data layer.

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;

/// Error returned by repositories, the allocator and the live mirror.
#[derive(Debug, Error)]
pub enum DataError {
    /// Store operation failed (transport, permission, missing document).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A write was attempted with no signed-in owner.
    #[error("not authenticated: no owner identity is signed in")]
    NotAuthenticated,

    /// A record the operation depends on does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Data in the store does not decode into the expected record.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// A record could not be encoded into document fields.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DataError {
    /// Whether the failure came from the store's transport rather than from
    /// the request itself. Callers typically surface these as transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Unavailable(_) | StoreError::Database(_))
        )
    }
}
