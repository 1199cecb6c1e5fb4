//! Error types for template store access.

use thiserror::Error;

/// Errors that can occur reading or writing template stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O error on the store file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Store content is not valid JSON for the expected layout.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file is not a template store (wrong or missing format tag).
    #[error("not a template store (format '{0}')")]
    BadFormat(String),

    /// Key not found in the store.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A histogram with inconsistent binning or non-finite content.
    #[error("invalid histogram '{key}': {reason}")]
    InvalidHistogram {
        /// Store key (or name) of the histogram.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Attempt to overwrite an existing key.
    #[error("duplicate key '{key}' (already written by {owner})")]
    DuplicateKey {
        /// Colliding key.
        key: String,
        /// Owner tag of the entry already in the store.
        owner: String,
    },
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for cs_core::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Io(e) => cs_core::Error::Io(e),
            StoreError::Json(e) => cs_core::Error::Json(e),
            other => cs_core::Error::Store(other.to_string()),
        }
    }
}
