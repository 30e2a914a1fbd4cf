//! Project scanning and the module dependency graph.
//!
//! [`ModuleGraph::build`] scans the configured source and resource sets,
//! resolves vendored dependencies through `flint.lock`, parses static imports
//! and rejects unresolved imports and cycles before any compilation starts.

#![warn(missing_docs)]

pub mod error;
pub mod graph;
pub mod imports;
pub mod module;
pub mod resolve;
pub mod scan;

pub use error::GraphError;
pub use graph::{ModuleGraph, DEFAULT_BUILTINS};
pub use imports::{parse_imports, ImportStmt};
pub use module::{Module, ModuleId, ModuleKind};
pub use resolve::{resolve_dependencies, ResolvedDependency};
