//! Content-addressed artifact cache.
//!
//! Compiled output is keyed by the hash of its source, the compiler version and
//! the target platform. Identical keys always map to identical bytes, so the
//! cache can be shared across projects and branches and consulted without
//! timestamps.

#![warn(missing_docs)]

pub mod artifact;
pub mod cache;
pub mod error;
pub mod key;

pub use artifact::Artifact;
pub use cache::{ArtifactCache, CacheStats, StoreOutcome};
pub use error::CacheError;
pub use key::ArtifactKey;
