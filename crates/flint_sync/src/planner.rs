//! Diffs a build manifest against the device state.
//!
//! Plans are ordered so that every operation can run against the device as it
//! is after the previous ones:
//!
//! 1. deletions that clear the way for a file becoming a directory or the
//!    other way round,
//! 2. `CreateDir`, parents before children,
//! 3. `Create` / `Update` by path,
//! 4. `Delete` by path,
//! 5. `DeleteDir`, deepest first.

use std::collections::BTreeSet;
use std::fmt;

use flint_build::{BuildManifest, ManifestEntry};
use flint_common::DevicePath;

use crate::state::DeviceState;

/// One device operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOp {
    /// Create a directory.
    CreateDir {
        /// Directory path.
        path: DevicePath,
    },
    /// Write a file that is not on the device.
    Create {
        /// The manifest entry to write.
        entry: ManifestEntry,
    },
    /// Overwrite a file whose content changed.
    Update {
        /// The manifest entry to write.
        entry: ManifestEntry,
    },
    /// Remove a file no longer in the manifest.
    Delete {
        /// File path.
        path: DevicePath,
    },
    /// Remove a directory no longer holding manifest files.
    DeleteDir {
        /// Directory path.
        path: DevicePath,
    },
}

impl SyncOp {
    /// The device path the operation targets.
    pub fn path(&self) -> &DevicePath {
        match self {
            SyncOp::CreateDir { path } | SyncOp::Delete { path } | SyncOp::DeleteDir { path } => {
                path
            }
            SyncOp::Create { entry } | SyncOp::Update { entry } => &entry.path,
        }
    }

    /// Short lowercase name of the operation.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncOp::CreateDir { .. } => "mkdir",
            SyncOp::Create { .. } => "create",
            SyncOp::Update { .. } => "update",
            SyncOp::Delete { .. } => "delete",
            SyncOp::DeleteDir { .. } => "rmdir",
        }
    }

    /// Bytes the operation sends to the device.
    pub fn bytes(&self) -> u64 {
        match self {
            SyncOp::Create { entry } | SyncOp::Update { entry } => entry.size,
            _ => 0,
        }
    }
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>6} {}", self.kind(), self.path())
    }
}

/// Operation counts of a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    /// Directories to create.
    pub create_dirs: usize,
    /// Files to create.
    pub creates: usize,
    /// Files to overwrite.
    pub updates: usize,
    /// Files to delete.
    pub deletes: usize,
    /// Directories to delete.
    pub delete_dirs: usize,
    /// Bytes to send.
    pub bytes: u64,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} dir(s) to create, {} dir(s) to remove, {} bytes",
            self.creates, self.updates, self.deletes, self.create_dirs, self.delete_dirs, self.bytes
        )
    }
}

/// An ordered list of device operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Operations in execution order.
    pub ops: Vec<SyncOp>,
}

impl SyncPlan {
    /// Number of operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns `true` if the device is already up to date.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Counts operations per kind.
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for op in &self.ops {
            match op {
                SyncOp::CreateDir { .. } => summary.create_dirs += 1,
                SyncOp::Create { .. } => summary.creates += 1,
                SyncOp::Update { .. } => summary.updates += 1,
                SyncOp::Delete { .. } => summary.deletes += 1,
                SyncOp::DeleteDir { .. } => summary.delete_dirs += 1,
            }
            summary.bytes += op.bytes();
        }
        summary
    }
}

/// Computes the operations that bring a device holding `state` to `manifest`.
///
/// `None` means nothing is known about the device, so everything is created.
pub fn plan(manifest: &BuildManifest, state: Option<&DeviceState>) -> SyncPlan {
    let empty = DeviceState::new();
    let state = state.unwrap_or(&empty);
    let known_dirs = state.known_directories();

    let mut wanted_dirs: BTreeSet<DevicePath> = BTreeSet::new();
    for entry in &manifest.entries {
        wanted_dirs.extend(entry.path.ancestors());
    }

    // A recorded file standing where a directory is wanted, or a recorded
    // directory where a file is wanted, has to go before anything is created.
    let mut cleared_files: BTreeSet<DevicePath> = BTreeSet::new();
    let mut cleared_dirs: BTreeSet<DevicePath> = BTreeSet::new();
    for dir in &wanted_dirs {
        if state.entries.contains_key(dir) {
            cleared_files.insert(dir.clone());
        }
    }
    for entry in &manifest.entries {
        if known_dirs.contains(&entry.path) {
            cleared_dirs.extend(
                known_dirs
                    .iter()
                    .filter(|d| d.starts_with(&entry.path))
                    .cloned(),
            );
            cleared_files.extend(
                state
                    .entries
                    .keys()
                    .filter(|p| p.starts_with(&entry.path))
                    .cloned(),
            );
        }
    }

    let mut ops = Vec::new();
    ops.extend(
        cleared_files
            .iter()
            .map(|path| SyncOp::Delete { path: path.clone() }),
    );
    ops.extend(
        deepest_first(cleared_dirs.iter().cloned())
            .into_iter()
            .map(|path| SyncOp::DeleteDir { path }),
    );

    let existing_dirs: BTreeSet<&DevicePath> = known_dirs
        .iter()
        .filter(|d| !cleared_dirs.contains(*d))
        .collect();
    let mut writes = Vec::new();
    let mut new_dirs: BTreeSet<DevicePath> = BTreeSet::new();
    let mut entries: Vec<&ManifestEntry> = manifest.entries.iter().collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    for entry in entries {
        let op = match state.get(&entry.path) {
            Some(recorded) if !cleared_files.contains(&entry.path) => {
                if recorded.hash == entry.hash {
                    continue;
                }
                SyncOp::Update {
                    entry: entry.clone(),
                }
            }
            _ => SyncOp::Create {
                entry: entry.clone(),
            },
        };
        new_dirs.extend(
            entry
                .path
                .ancestors()
                .filter(|dir| !existing_dirs.contains(&dir)),
        );
        writes.push(op);
    }
    // Parents sort before their children in path order.
    ops.extend(new_dirs.into_iter().map(|path| SyncOp::CreateDir { path }));
    ops.extend(writes);

    ops.extend(
        state
            .entries
            .keys()
            .filter(|path| manifest.get(path).is_none() && !cleared_files.contains(*path))
            .map(|path| SyncOp::Delete { path: path.clone() }),
    );
    ops.extend(
        deepest_first(
            known_dirs
                .iter()
                .filter(|dir| !wanted_dirs.contains(*dir) && !cleared_dirs.contains(*dir))
                .cloned(),
        )
        .into_iter()
        .map(|path| SyncOp::DeleteDir { path }),
    );

    let plan = SyncPlan { ops };
    tracing::debug!(ops = plan.len(), summary = %plan.summary(), "planned sync");
    plan
}

fn deepest_first(dirs: impl Iterator<Item = DevicePath>) -> Vec<DevicePath> {
    let mut dirs: Vec<DevicePath> = dirs.collect();
    dirs.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| a.cmp(b)));
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::DeviceEntry;
    use flint_build::ArtifactRef;
    use flint_common::ContentHash;
    use std::path::PathBuf;

    fn path(s: &str) -> DevicePath {
        DevicePath::new(s).unwrap()
    }

    fn entry(p: &str, content: &str) -> ManifestEntry {
        ManifestEntry {
            path: path(p),
            hash: ContentHash::from_bytes(content.as_bytes()),
            size: content.len() as u64,
            artifact: ArtifactRef::Source {
                path: PathBuf::from(p),
            },
            origin: p.to_string(),
        }
    }

    fn manifest(files: &[(&str, &str)]) -> BuildManifest {
        BuildManifest {
            project: "p".to_string(),
            version: "0.1.0".to_string(),
            platform: "esp32".to_string(),
            entries: files.iter().map(|(p, c)| entry(p, c)).collect(),
        }
    }

    fn state(files: &[(&str, &str)]) -> DeviceState {
        let mut state = DeviceState::new();
        for (p, c) in files {
            state.record_file(
                path(p),
                DeviceEntry {
                    hash: ContentHash::from_bytes(c.as_bytes()),
                    size: c.len() as u64,
                },
            );
        }
        state
    }

    fn rendered(plan: &SyncPlan) -> Vec<String> {
        plan.ops
            .iter()
            .map(|op| format!("{} {}", op.kind(), op.path()))
            .collect()
    }

    #[test]
    fn first_sync_creates_everything() {
        let m = manifest(&[("main.mpy", "m"), ("lib/a/x.mpy", "x"), ("lib/y.mpy", "y")]);
        let plan = plan(&m, None);
        assert_eq!(
            rendered(&plan),
            vec![
                "mkdir lib",
                "mkdir lib/a",
                "create lib/a/x.mpy",
                "create lib/y.mpy",
                "create main.mpy",
            ]
        );
        let summary = plan.summary();
        assert_eq!(summary.creates, 3);
        assert_eq!(summary.create_dirs, 2);
        assert_eq!(summary.bytes, 3);
    }

    #[test]
    fn unchanged_files_are_elided() {
        let files = [("main.mpy", "m"), ("lib/x.mpy", "x")];
        assert!(plan(&manifest(&files), Some(&state(&files))).is_empty());
    }

    #[test]
    fn diff_orders_operations() {
        let old = state(&[
            ("main.mpy", "old"),
            ("old/deep/gone.mpy", "g"),
            ("keep.txt", "k"),
            ("stale.mpy", "s"),
        ]);
        let new = manifest(&[("main.mpy", "new"), ("keep.txt", "k"), ("www/index.html", "i")]);
        assert_eq!(
            rendered(&plan(&new, Some(&old))),
            vec![
                "mkdir www",
                "update main.mpy",
                "create www/index.html",
                "delete old/deep/gone.mpy",
                "delete stale.mpy",
                "rmdir old/deep",
                "rmdir old",
            ]
        );
    }

    #[test]
    fn known_directories_are_not_recreated() {
        let mut old = state(&[("lib/a.mpy", "a")]);
        old.record_dir(path("empty"));
        let new = manifest(&[("lib/a.mpy", "a"), ("lib/b.mpy", "b"), ("empty/c.mpy", "c")]);
        assert_eq!(
            rendered(&plan(&new, Some(&old))),
            vec!["create empty/c.mpy", "create lib/b.mpy"]
        );
    }

    #[test]
    fn root_is_never_deleted() {
        let old = state(&[("main.mpy", "m")]);
        let plan = plan(&manifest(&[]), Some(&old));
        assert_eq!(rendered(&plan), vec!["delete main.mpy"]);
    }

    #[test]
    fn file_replaced_by_directory() {
        let old = state(&[("config", "c")]);
        let new = manifest(&[("config/wifi.json", "w")]);
        assert_eq!(
            rendered(&plan(&new, Some(&old))),
            vec!["delete config", "mkdir config", "create config/wifi.json"]
        );
    }

    #[test]
    fn directory_replaced_by_file() {
        let old = state(&[("config/wifi.json", "w"), ("config/sub/x", "x")]);
        let new = manifest(&[("config", "c")]);
        assert_eq!(
            rendered(&plan(&new, Some(&old))),
            vec![
                "delete config/sub/x",
                "delete config/wifi.json",
                "rmdir config/sub",
                "rmdir config",
                "create config",
            ]
        );
    }

    #[test]
    fn single_content_change_is_single_update() {
        let files = [("a.mpy", "a"), ("b.mpy", "b"), ("lib/c.mpy", "c")];
        let old = state(&files);
        let new = manifest(&[("a.mpy", "a"), ("b.mpy", "B"), ("lib/c.mpy", "c")]);
        let plan = plan(&new, Some(&old));
        assert_eq!(rendered(&plan), vec!["update b.mpy"]);
        assert_eq!(plan.summary().updates, 1);
    }
}
