//! Shared foundational types used across the Flint build-and-sync toolchain.
//!
//! This crate provides content hashing for cache keys and change detection, and
//! normalized device filesystem paths.

#![warn(missing_docs)]

pub mod device_path;
pub mod hash;

pub use device_path::{DevicePath, DevicePathError};
pub use hash::{ContentHash, ParseHashError};
