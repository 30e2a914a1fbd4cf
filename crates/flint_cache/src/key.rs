//! Cache keys.

use std::fmt;

use flint_common::ContentHash;
use serde::{Deserialize, Serialize};

/// Platform tag used for hook-generated files, which are never compiled.
pub const GENERATED_PLATFORM: &str = "generated";

/// Identifies one compiled artifact: the same source, under the same name,
/// compiled by the same compiler version with the same arguments for the same
/// platform always yields the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    /// Hash of the source bytes.
    pub source_hash: ContentHash,
    /// Source name the compiler embeds in its output (tracebacks).
    pub source_name: String,
    /// Version string reported by the compiler.
    pub compiler_version: String,
    /// Extra compiler arguments, unexpanded.
    pub compiler_args: Vec<String>,
    /// Target platform tag.
    pub platform: String,
}

impl ArtifactKey {
    /// Creates a key for compiled output.
    pub fn new(
        source_hash: ContentHash,
        compiler_version: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            source_hash,
            source_name: String::new(),
            compiler_version: compiler_version.into(),
            compiler_args: Vec::new(),
            platform: platform.into(),
        }
    }

    /// Sets the source name passed to the compiler.
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Sets the extra compiler arguments.
    pub fn with_compiler_args(mut self, args: &[String]) -> Self {
        self.compiler_args = args.to_vec();
        self
    }

    /// Creates a key for bytes produced by a build hook rather than a compiler.
    pub fn generated(content_hash: ContentHash) -> Self {
        Self::new(content_hash, "", GENERATED_PLATFORM)
    }

    /// Hash of every component; addresses the object on disk.
    pub fn digest(&self) -> ContentHash {
        let arg_count = (self.compiler_args.len() as u64).to_le_bytes();
        let mut parts: Vec<&[u8]> = vec![
            self.source_hash.as_bytes().as_slice(),
            self.source_name.as_bytes(),
            self.compiler_version.as_bytes(),
            self.platform.as_bytes(),
            arg_count.as_slice(),
        ];
        parts.extend(self.compiler_args.iter().map(|a| a.as_bytes()));
        ContentHash::from_parts(&parts)
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source_hash)?;
        if !self.source_name.is_empty() {
            write!(f, " ({})", self.source_name)?;
        }
        write!(f, " [{}", self.compiler_version)?;
        for arg in &self.compiler_args {
            write!(f, " {arg}")?;
        }
        write!(f, " / {}]", self.platform)
    }
}
