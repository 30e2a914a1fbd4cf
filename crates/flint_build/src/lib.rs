//! Compilation scheduling, manifest construction and build hooks.
//!
//! The [`CompilationScheduler`] walks a [`flint_graph::ModuleGraph`] level by
//! level, compiling cache misses in parallel. The [`ManifestBuilder`] turns the
//! resulting [`BuildReport`] into a [`BuildManifest`]: the exact set of files,
//! with content hashes, that belongs on the device.

#![warn(missing_docs)]

pub mod compiler;
pub mod error;
pub mod hooks;
pub mod manifest;
pub mod output;
pub mod scheduler;

pub use compiler::{CompileOutcome, Compiler, ExternalCompiler};
pub use error::{BuildError, CompilerError, ManifestError};
pub use hooks::{AppInfoHook, BuildHook, GeneratedFile, HookContext, HookRegistry, HookStage};
pub use manifest::{ArtifactRef, BuildManifest, ManifestBuilder, ManifestEntry};
pub use output::materialize;
pub use scheduler::{BuildReport, CompilationScheduler, ModuleOutcome};
