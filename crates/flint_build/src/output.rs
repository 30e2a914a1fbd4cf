//! Materializes a manifest as a directory tree on the host.

use std::path::Path;

use flint_cache::ArtifactCache;

use crate::error::BuildError;
use crate::manifest::BuildManifest;

/// Writes every manifest entry below `out_dir`, mirroring the device layout.
///
/// The directory is recreated from scratch so it never holds files from an
/// older build. Returns the number of files written.
pub fn materialize(
    manifest: &BuildManifest,
    cache: &ArtifactCache,
    out_dir: &Path,
) -> Result<usize, BuildError> {
    let io_err = |path: &Path, e| BuildError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    if out_dir.exists() {
        std::fs::remove_dir_all(out_dir).map_err(|e| io_err(out_dir, e))?;
    }
    std::fs::create_dir_all(out_dir).map_err(|e| io_err(out_dir, e))?;

    for entry in &manifest.entries {
        let bytes = BuildManifest::read_entry(entry, cache)?;
        let dest = out_dir.join(entry.path.as_str());
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::write(&dest, bytes).map_err(|e| io_err(&dest, e))?;
    }
    tracing::debug!(files = manifest.entries.len(), dir = %out_dir.display(), "wrote output tree");
    Ok(manifest.entries.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ArtifactRef, ManifestEntry};
    use flint_cache::ArtifactKey;
    use flint_common::{ContentHash, DevicePath};

    #[test]
    fn writes_tree_and_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::open(&dir.path().join("cache")).unwrap();
        let key = ArtifactKey::generated(ContentHash::from_bytes(b"compiled"));
        cache.store(&key, b"compiled").unwrap();
        let source = dir.path().join("index.html");
        std::fs::write(&source, "<html>").unwrap();

        let manifest = BuildManifest {
            project: "p".to_string(),
            version: "0.1.0".to_string(),
            platform: "esp32".to_string(),
            entries: vec![
                ManifestEntry {
                    path: DevicePath::new("lib/mod.mpy").unwrap(),
                    hash: ContentHash::from_bytes(b"compiled"),
                    size: 8,
                    artifact: ArtifactRef::Cache { key },
                    origin: "src/lib/mod.py".to_string(),
                },
                ManifestEntry {
                    path: DevicePath::new("www/index.html").unwrap(),
                    hash: ContentHash::from_bytes(b"<html>"),
                    size: 6,
                    artifact: ArtifactRef::Source { path: source },
                    origin: "www/index.html".to_string(),
                },
            ],
        };

        let out = dir.path().join("build/device");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("stale.mpy"), "old").unwrap();

        assert_eq!(materialize(&manifest, &cache, &out).unwrap(), 2);
        assert_eq!(std::fs::read(out.join("lib/mod.mpy")).unwrap(), b"compiled");
        assert_eq!(std::fs::read(out.join("www/index.html")).unwrap(), b"<html>");
        assert!(!out.join("stale.mpy").exists());
    }
}
