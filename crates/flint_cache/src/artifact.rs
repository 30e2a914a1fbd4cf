//! Binary object format for cached artifacts.
//!
//! Each object file is a 4-byte little-endian header length, a bincode-encoded
//! [`ArtifactHeader`] and the payload. The header repeats the full key so that
//! a digest collision can never hand back another module's bytes.

use flint_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::key::ArtifactKey;

/// Magic bytes identifying a Flint cache object.
const ARTIFACT_MAGIC: [u8; 4] = *b"FLNT";

/// Current object format version. Increment on breaking changes to the header
/// or payload layout.
const ARTIFACT_FORMAT_VERSION: u32 = 2;

/// Header prepended to every cached object for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Magic bytes: must be `b"FLNT"`.
    pub magic: [u8; 4],
    /// Object format version.
    pub format_version: u32,
    /// The key the payload was stored under.
    pub key: ArtifactKey,
    /// Content hash of the payload.
    pub checksum: ContentHash,
}

/// A cached artifact and the key it was stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Cache key.
    pub key: ArtifactKey,
    /// Artifact bytes.
    pub bytes: Vec<u8>,
}

impl Artifact {
    /// Content hash of the artifact bytes, as recorded in manifests.
    pub fn hash(&self) -> ContentHash {
        ContentHash::from_bytes(&self.bytes)
    }
}

/// Serializes an object file.
pub(crate) fn encode(key: &ArtifactKey, data: &[u8]) -> Result<Vec<u8>, CacheError> {
    let header = ArtifactHeader {
        magic: ARTIFACT_MAGIC,
        format_version: ARTIFACT_FORMAT_VERSION,
        key: key.clone(),
        checksum: ContentHash::from_bytes(data),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + data.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(data);
    Ok(output)
}

/// Parses and validates an object file.
///
/// Returns `None` for truncated data, a bad header, a foreign key, or a
/// payload that fails its checksum.
pub(crate) fn decode(raw: &[u8], expected: &ArtifactKey) -> Option<Artifact> {
    if raw.len() < 4 {
        return None;
    }
    let header_len = u32::from_le_bytes(raw[..4].try_into().ok()?) as usize;
    if raw.len() < 4 + header_len {
        return None;
    }

    let header: ArtifactHeader =
        bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
            .ok()?
            .0;
    if header.magic != ARTIFACT_MAGIC || header.format_version != ARTIFACT_FORMAT_VERSION {
        return None;
    }
    if &header.key != expected {
        return None;
    }

    let payload = &raw[4 + header_len..];
    if ContentHash::from_bytes(payload) != header.checksum {
        return None;
    }
    Some(Artifact {
        key: header.key,
        bytes: payload.to_vec(),
    })
}
