//! The persisted record of what is confirmed on the device.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use flint_common::{ContentHash, DevicePath};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::transport::{RemoteDigest, RemoteEntry, RemoteKind};

/// A file confirmed on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Hash of the content that was written.
    pub hash: ContentHash,
    /// Size in bytes.
    pub size: u64,
}

/// Files and directories known to be on the device.
///
/// Only confirmed operations are recorded, so the state never claims more than
/// the device actually holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Files by device path.
    #[serde(default)]
    pub entries: BTreeMap<DevicePath, DeviceEntry>,
    /// Directories created by a sync (or found by a rescan).
    #[serde(default)]
    pub directories: BTreeSet<DevicePath>,
}

impl DeviceState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a state file. Returns `Ok(None)` when it does not exist yet.
    pub fn load(path: &Path) -> Result<Option<Self>, SyncError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SyncError::State {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| SyncError::State {
                path: path.to_path_buf(),
                reason: format!("{e} (run `flint sync --rescan` to rebuild it)"),
            })
    }

    /// Writes the state file, replacing the previous one atomically.
    pub fn save(&self, path: &Path) -> Result<(), SyncError> {
        let err = |e: std::io::Error| SyncError::State {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| SyncError::State {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(err)?;
        std::fs::rename(&tmp, path).map_err(err)
    }

    /// Rebuilds a state from a device listing.
    ///
    /// Files reported with a hash are adopted as they are. Size/mtime entries
    /// carry no hash, so they keep the entry from `previous` when the size still
    /// matches and are left untracked otherwise (the next plan rewrites them if
    /// the manifest wants them).
    pub fn from_listing(listing: &[RemoteEntry], previous: Option<&DeviceState>) -> Self {
        let mut state = Self::new();
        for remote in listing {
            match remote.kind {
                RemoteKind::Dir => {
                    state.directories.insert(remote.path.clone());
                }
                RemoteKind::File(RemoteDigest::Hash(hash)) => {
                    state.entries.insert(
                        remote.path.clone(),
                        DeviceEntry {
                            hash,
                            size: remote.size,
                        },
                    );
                }
                RemoteKind::File(RemoteDigest::SizeMtime { size, .. }) => {
                    let known = previous
                        .and_then(|p| p.entries.get(&remote.path))
                        .filter(|entry| entry.size == size);
                    match known {
                        Some(entry) => {
                            state.entries.insert(remote.path.clone(), *entry);
                        }
                        None => tracing::debug!(path = %remote.path, "untracked device file"),
                    }
                }
            }
        }
        state
    }

    /// Returns the recorded entry for a file.
    pub fn get(&self, path: &DevicePath) -> Option<&DeviceEntry> {
        self.entries.get(path)
    }

    /// Number of recorded files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no files are recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a written file.
    pub fn record_file(&mut self, path: DevicePath, entry: DeviceEntry) {
        self.entries.insert(path, entry);
    }

    /// Forgets a deleted file.
    pub fn forget_file(&mut self, path: &DevicePath) -> Option<DeviceEntry> {
        self.entries.remove(path)
    }

    /// Records a created directory.
    pub fn record_dir(&mut self, path: DevicePath) {
        self.directories.insert(path);
    }

    /// Forgets a directory.
    pub fn forget_dir(&mut self, path: &DevicePath) -> bool {
        self.directories.remove(path)
    }

    /// Every directory the state implies: explicit ones plus the ancestors of
    /// recorded files.
    pub fn known_directories(&self) -> BTreeSet<DevicePath> {
        let mut dirs = self.directories.clone();
        for path in self.entries.keys() {
            dirs.extend(path.ancestors());
        }
        dirs
    }
}
