//! Directory scanning with include/exclude/ignore globs.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::error::GraphError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A file found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Absolute (root-joined) path.
    pub path: PathBuf,
    /// Path relative to the scanned root.
    pub rel_path: PathBuf,
}

/// Compiled glob filters for one scan.
///
/// Patterns are matched against `/`-separated root-relative paths; `*` stays
/// within one component and `**` crosses directories. Exclude and ignore
/// patterns also match any ancestor directory, so `.git` or `tests` prune the
/// whole subtree.
#[derive(Debug, Default)]
pub struct ScanFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    skip_dirs: Vec<PathBuf>,
}

impl ScanFilter {
    /// Compiles include, exclude and workspace-wide ignore patterns.
    pub fn new(include: &[String], exclude: &[String], ignore: &[String]) -> Result<Self, GraphError> {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude.iter().chain(ignore))?,
            skip_dirs: Vec::new(),
        })
    }

    /// Never descends into the given absolute directories (build output, package
    /// store) even when they lie under the scanned root.
    pub fn skip_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.skip_dirs.extend(dirs);
        self
    }

    fn excluded(&self, rel: &Path) -> bool {
        let mut prefix = String::new();
        for component in rel.components() {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(&component.as_os_str().to_string_lossy());
            if self.exclude.iter().any(|p| p.matches_with(&prefix, MATCH_OPTIONS)) {
                return true;
            }
        }
        false
    }

    fn included(&self, rel: &Path) -> bool {
        self.include.is_empty()
            || self
                .include
                .iter()
                .any(|p| p.matches_with(&slash_path(rel), MATCH_OPTIONS))
    }
}

fn compile<'a>(patterns: impl IntoIterator<Item = &'a String>) -> Result<Vec<Pattern>, GraphError> {
    patterns
        .into_iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| GraphError::InvalidPath {
                path: PathBuf::from(p),
                reason: format!("bad glob pattern: {e}"),
            })
        })
        .collect()
}

/// Renders a relative path with `/` separators.
pub fn slash_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Recursively collects files under `root` accepted by `filter`, sorted by
/// relative path so scan results never depend on directory iteration order.
pub fn scan_dir(root: &Path, filter: &ScanFilter) -> Result<Vec<ScannedFile>, GraphError> {
    let mut files = Vec::new();
    walk_dir(root, Path::new(""), filter, &mut files)?;
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn walk_dir(
    root: &Path,
    rel_dir: &Path,
    filter: &ScanFilter,
    files: &mut Vec<ScannedFile>,
) -> Result<(), GraphError> {
    let dir = root.join(rel_dir);
    let io_err = |source| GraphError::Io {
        path: dir.clone(),
        source,
    };
    for entry in std::fs::read_dir(&dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        let rel = rel_dir.join(entry.file_name());
        if filter.excluded(&rel) {
            continue;
        }
        if path.is_dir() {
            if filter.skip_dirs.iter().any(|d| d == &path) {
                continue;
            }
            walk_dir(root, &rel, filter, files)?;
        } else if filter.included(&rel) {
            files.push(ScannedFile {
                path,
                rel_path: rel,
            });
        }
    }
    Ok(())
}
