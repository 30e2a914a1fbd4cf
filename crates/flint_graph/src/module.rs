//! Module identity and attributes.

use std::fmt;
use std::path::PathBuf;

use flint_common::{ContentHash, DevicePath};
use serde::{Deserialize, Serialize};

/// Identity of a module: the project-relative path of its source file,
/// `/`-separated (e.g. `src/drivers/led.py`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    /// Creates an identity from a `/`-separated path string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleId({:?})", self.0)
    }
}

/// What a module is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleKind {
    /// A package initializer (`__init__.py`).
    Package,
    /// A plain Python source file.
    File,
    /// A static file copied verbatim.
    Resource,
    /// A file of a vendored external dependency. Always a leaf.
    External {
        /// Name of the dependency that contributed the file.
        dependency: String,
    },
}

/// A single file tracked by the build.
#[derive(Debug, Clone)]
pub struct Module {
    /// Project-relative identity.
    pub id: ModuleId,
    /// What kind of file this is.
    pub kind: ModuleKind,
    /// Absolute path of the source file.
    pub source: PathBuf,
    /// Path relative to the source set (or dependency) root.
    pub rel_path: PathBuf,
    /// Device directory the file is placed under, `None` for the device root.
    pub device_dir: Option<DevicePath>,
    /// Hash of the source bytes.
    pub hash: ContentHash,
    /// Source size in bytes.
    pub size: u64,
    /// Whether the file is cross-compiled (otherwise copied verbatim).
    pub compile: bool,
    /// Modules this one imports, in declaration order without duplicates.
    pub dependencies: Vec<ModuleId>,
    /// Dotted import name, for Python files.
    pub import_name: Option<String>,
}

impl Module {
    /// Returns `true` for project Python files whose imports are scanned.
    pub fn is_project_python(&self) -> bool {
        matches!(self.kind, ModuleKind::Package | ModuleKind::File)
    }

    /// Returns `true` for vendored dependency files.
    pub fn is_external(&self) -> bool {
        matches!(self.kind, ModuleKind::External { .. })
    }

    /// Returns the package that relative imports in this module start from.
    ///
    /// For `pkg/__init__.py` that is `pkg` itself; for `pkg/mod.py` it is `pkg`.
    pub fn package_name(&self) -> Option<&str> {
        let name = self.import_name.as_deref()?;
        if self.kind == ModuleKind::Package {
            Some(name)
        } else {
            Some(name.rsplit_once('.').map(|(pkg, _)| pkg).unwrap_or(""))
        }
    }
}

/// Derives the dotted import name from a path relative to its source root.
///
/// `drivers/__init__.py` → `drivers`, `drivers/led.py` → `drivers.led`.
/// Returns `None` for non-Python files.
pub fn import_name(rel_path: &std::path::Path) -> Option<String> {
    if rel_path.extension()? != "py" {
        return None;
    }
    let mut parts: Vec<String> = rel_path
        .parent()
        .into_iter()
        .flat_map(|p| p.components())
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let stem = rel_path.file_stem()?.to_string_lossy().into_owned();
    if stem != "__init__" {
        parts.push(stem);
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("."))
    }
}
