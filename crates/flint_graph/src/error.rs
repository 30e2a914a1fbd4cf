//! Error types for graph construction.

use std::path::PathBuf;

use crate::module::ModuleId;

/// Errors raised while scanning the project and building the module graph.
///
/// All of them are fatal: no compilation starts when the graph is invalid.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A file or directory could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A declared dependency does not resolve to any module, vendored package or
    /// device builtin.
    #[error("unresolved dependency '{dependency}' required by {module}: {reason}")]
    UnresolvedDependency {
        /// The requiring module, or `flint.toml` for external dependency specs.
        module: String,
        /// The import statement or dependency name that failed.
        dependency: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The import graph contains a cycle.
    #[error("cyclic dependency: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// Modules on the cycle, in traversal order.
        cycle: Vec<ModuleId>,
    },

    /// Two source sets contributed the same file.
    #[error("module {id} is contributed by more than one source set")]
    DuplicateModule {
        /// The duplicated module identity.
        id: ModuleId,
    },

    /// A file path cannot be placed on the device.
    #[error("invalid device placement for {path}: {reason}")]
    InvalidPath {
        /// The offending host path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },
}

fn format_cycle(cycle: &[ModuleId]) -> String {
    let mut parts: Vec<&str> = cycle.iter().map(ModuleId::as_str).collect();
    if let Some(first) = parts.first().copied() {
        parts.push(first);
    }
    parts.join(" -> ")
}
