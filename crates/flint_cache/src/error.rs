//! Error types for cache operations.

use std::path::PathBuf;

use crate::key::ArtifactKey;

/// Errors that can occur during cache operations.
///
/// Reads never produce these: an unreadable or damaged object is a miss.
/// Writes fail on I/O problems and on a key whose stored bytes differ from the
/// bytes being stored, which means the caching invariant no longer holds.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A valid object already exists for the key with different content.
    #[error("cache corruption: artifact {key} is already stored with different content")]
    Corruption {
        /// The conflicting key.
        key: ArtifactKey,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}
