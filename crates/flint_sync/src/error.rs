//! Error types for device synchronization.

use std::path::PathBuf;
use std::time::Duration;

use flint_build::ManifestError;
use flint_common::DevicePath;

/// A single device operation failed.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The operation did not finish in time. It may or may not have taken effect.
    #[error("{op} {path} timed out after {after:?}")]
    Timeout {
        /// Operation name.
        op: &'static str,
        /// Device path the operation targeted.
        path: String,
        /// The timeout that expired.
        after: Duration,
    },

    /// The path does not exist on the device.
    #[error("{path} does not exist on the device")]
    NotFound {
        /// The missing path.
        path: String,
    },

    /// A directory could not be removed because it still has children.
    #[error("directory {path} is not empty")]
    NotEmpty {
        /// The directory.
        path: String,
    },

    /// The transport cannot perform this operation.
    #[error("transport does not support {op}")]
    Unsupported {
        /// Operation name.
        op: &'static str,
    },

    /// A host-side I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path involved.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The device or the tool driving it reported an error.
    #[error("device error: {reason}")]
    Device {
        /// Error text reported by the device.
        reason: String,
    },

    /// The operation reported success but the device does not show the result.
    #[error("verification of {path} failed: {reason}")]
    Verification {
        /// The path that was checked.
        path: String,
        /// What was found instead.
        reason: String,
    },
}

impl TransportError {
    /// Returns `true` for timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

/// Errors that stop a sync.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// An operation still failed after every retry.
    #[error("sync failed at {path} after {attempts} attempt(s): {cause}")]
    Failed {
        /// Path of the operation that failed.
        path: DevicePath,
        /// Attempts made.
        attempts: u32,
        /// The last error.
        cause: TransportError,
    },

    /// The sync was cancelled between operations.
    #[error("sync interrupted after {applied} operation(s)")]
    Interrupted {
        /// Operations applied and recorded before the interruption.
        applied: usize,
    },

    /// Listing the device failed.
    #[error("cannot list device files: {0}")]
    Listing(TransportError),

    /// Artifact bytes for a manifest entry could not be produced.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The device state file could not be read or written.
    #[error("device state error at {path}: {reason}")]
    State {
        /// The state file.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },
}
