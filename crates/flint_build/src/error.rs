//! Error types for building.

use std::path::PathBuf;

use flint_cache::CacheError;
use flint_common::DevicePath;

/// Failures of the compiler adapter itself, as opposed to a module that does
/// not compile (which is an ordinary [`crate::CompileOutcome::Failed`]).
#[derive(Debug, thiserror::Error)]
pub enum CompilerError {
    /// The compiler executable could not be started.
    #[error("failed to launch compiler '{program}': {source}")]
    Launch {
        /// The executable that was invoked.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The compiler version could not be determined.
    #[error("cannot determine version of compiler '{program}': {reason}")]
    Version {
        /// The executable that was queried.
        program: String,
        /// Description of the failure.
        reason: String,
    },

    /// Reading compiler output failed.
    #[error("compiler output error at {path}: {source}")]
    Io {
        /// The output path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors raised while assembling or persisting a build manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Two modules (or a module and a generated file) map to one device path.
    #[error("manifest conflict: {path} is produced by both {first} and {second}")]
    Conflict {
        /// The contested device path.
        path: DevicePath,
        /// The origin that claimed the path first.
        first: String,
        /// The origin that tried to claim it again.
        second: String,
    },

    /// The build had failed or skipped modules.
    #[error("cannot build a manifest: {failed} module(s) did not build")]
    IncompleteBuild {
        /// Number of unsuccessful modules.
        failed: usize,
    },

    /// A module has no valid device placement.
    #[error("module {module} cannot be placed on the device: {reason}")]
    InvalidPath {
        /// The module identity.
        module: String,
        /// Description of the problem.
        reason: String,
    },

    /// The bytes for an entry are gone or no longer match its hash.
    #[error("artifact for {path} is unavailable: {reason}")]
    MissingArtifact {
        /// Device path of the entry.
        path: DevicePath,
        /// Description of the problem.
        reason: String,
    },

    /// Reading or writing a manifest file failed.
    #[error("manifest I/O error at {path}: {source}")]
    Io {
        /// The manifest path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A manifest file could not be parsed.
    #[error("failed to parse manifest {path}: {reason}")]
    Parse {
        /// The manifest path.
        path: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },
}

/// Errors that abort a build.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The artifact cache failed, including [`CacheError::Corruption`].
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The compiler could not be run at all.
    #[error(transparent)]
    Compiler(#[from] CompilerError),

    /// The manifest could not be built or saved.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The worker pool could not be created.
    #[error("failed to start build workers: {reason}")]
    ThreadPool {
        /// Description of the failure.
        reason: String,
    },

    /// `[hooks] enabled` names a hook that does not exist.
    #[error("unknown hook '{name}' (available: {available})")]
    UnknownHook {
        /// The requested name.
        name: String,
        /// Comma-separated registered hook names.
        available: String,
    },

    /// A hook failed.
    #[error("hook '{name}' failed: {reason}")]
    Hook {
        /// The hook name.
        name: String,
        /// Description of the failure.
        reason: String,
    },

    /// Writing build output failed.
    #[error("build output error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}
