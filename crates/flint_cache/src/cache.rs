//! The on-disk artifact cache.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::artifact::{decode, encode, Artifact};
use crate::error::CacheError;
use crate::key::ArtifactKey;

/// Subdirectory holding object files.
const OBJECTS_DIR: &str = "objects";

/// Extension of object files.
const OBJECT_EXT: &str = "art";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Result of [`ArtifactCache::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// A new object was written.
    Stored,
    /// An identical object was already present; nothing was written.
    AlreadyPresent,
}

/// Object count and total size of a cache directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of object files.
    pub objects: usize,
    /// Total size of object files in bytes.
    pub bytes: u64,
}

/// Content-addressed store of compiled artifacts.
///
/// Objects live at `<dir>/objects/<first two hex digits>/<digest>.art`. The
/// cache is safe to use from many threads (and processes) at once: objects are
/// written to a unique temporary file and renamed into place, so readers only
/// ever observe complete files.
#[derive(Debug)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    /// Opens (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        let objects = dir.join(OBJECTS_DIR);
        std::fs::create_dir_all(&objects).map_err(|e| CacheError::Io {
            path: objects,
            source: e,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Returns the cache root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the object file path for a key.
    pub fn object_path(&self, key: &ArtifactKey) -> PathBuf {
        let digest = key.digest().to_string();
        self.dir
            .join(OBJECTS_DIR)
            .join(&digest[..2])
            .join(format!("{digest}.{OBJECT_EXT}"))
    }

    /// Looks up an artifact.
    ///
    /// Fail-safe: a missing, truncated, damaged or foreign object is a miss.
    pub fn lookup(&self, key: &ArtifactKey) -> Option<Artifact> {
        let path = self.object_path(key);
        let raw = std::fs::read(&path).ok()?;
        let artifact = decode(&raw, key);
        if artifact.is_none() {
            tracing::warn!(path = %path.display(), "ignoring damaged cache object");
        }
        artifact
    }

    /// Returns `true` if a valid object exists for the key.
    pub fn contains(&self, key: &ArtifactKey) -> bool {
        self.lookup(key).is_some()
    }

    /// Stores bytes under a key.
    ///
    /// Storing the same bytes again is a no-op. Storing different bytes for a
    /// key that already holds a valid object fails with
    /// [`CacheError::Corruption`]. A damaged object is replaced.
    pub fn store(&self, key: &ArtifactKey, data: &[u8]) -> Result<StoreOutcome, CacheError> {
        if let Some(existing) = self.lookup(key) {
            if existing.bytes == data {
                return Ok(StoreOutcome::AlreadyPresent);
            }
            return Err(CacheError::Corruption { key: key.clone() });
        }

        let path = self.object_path(key);
        let raw = encode(key, data)?;
        write_atomic(&path, &raw)?;
        tracing::debug!(key = %key, bytes = data.len(), "stored artifact");
        Ok(StoreOutcome::Stored)
    }

    /// Removes every object. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let objects = self.dir.join(OBJECTS_DIR);
        let removed = self.stats()?.objects;
        if objects.exists() {
            std::fs::remove_dir_all(&objects).map_err(|e| CacheError::Io {
                path: objects.clone(),
                source: e,
            })?;
        }
        std::fs::create_dir_all(&objects).map_err(|e| CacheError::Io {
            path: objects,
            source: e,
        })?;
        Ok(removed)
    }

    /// Counts objects and their total size.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();
        let objects = self.dir.join(OBJECTS_DIR);
        if !objects.exists() {
            return Ok(stats);
        }
        for shard in read_dir(&objects)? {
            if !shard.is_dir() {
                continue;
            }
            for object in read_dir(&shard)? {
                if object.extension().and_then(|e| e.to_str()) == Some(OBJECT_EXT) {
                    let len = std::fs::metadata(&object)
                        .map_err(|e| CacheError::Io {
                            path: object.clone(),
                            source: e,
                        })?
                        .len();
                    stats.objects += 1;
                    stats.bytes += len;
                }
            }
        }
        Ok(stats)
    }
}

fn read_dir(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let io_err = |e| CacheError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()).map_err(io_err))
        .collect()
}

/// Writes to a uniquely named sibling temp file, then renames over `path`.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let io_err = |path: &Path, e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let dir = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = dir.join(format!(
        ".{file_name}.{}.{}.tmp",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&tmp, data).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}
