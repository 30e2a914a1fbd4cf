//! Parsing and validation of `flint.toml` project configuration and the
//! `flint.lock` pinned dependency set.
//!
//! This crate produces strongly-typed [`ProjectConfig`] and [`Lockfile`] values.
//! The build and sync engines only consume these already-validated structures.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod lockfile;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE};
pub use lockfile::{load_lockfile, LockedPackage, Lockfile, LOCK_FILE};
pub use types::*;
