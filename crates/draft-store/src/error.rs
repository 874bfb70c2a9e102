use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when reading or writing the draft record.
#[derive(Debug, Error)]
pub enum DraftStoreError {
    /// The backing file could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The record was written by an incompatible version of the client.
    ///
    /// The record is left in place so it can be recovered by hand.
    #[error("Draft schema mismatch: found version {found}, expected {expected}")]
    SchemaMismatch { found: u32, expected: u32 },
}

/// Result type for draft store operations.
pub type Result<T> = std::result::Result<T, DraftStoreError>;
