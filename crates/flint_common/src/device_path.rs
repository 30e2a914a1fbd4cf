//! Normalized paths on the device filesystem.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// A relative path on the device filesystem, e.g. `lib/aioble/core.mpy`.
///
/// Always `/`-separated, never empty, and never contains `.`, `..` or empty
/// components. The device root itself is not representable; operations that
/// talk about "the root" use `Option<DevicePath>` instead.
///
/// Ordering is plain string ordering, which places a directory before every
/// path inside it (`a` < `a/b` < `a/b/c`).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DevicePath(String);

/// Error returned for strings that are not valid device paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device path '{path}': {reason}")]
pub struct DevicePathError {
    /// The rejected input.
    pub path: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl DevicePath {
    /// Parses and normalizes a device path.
    ///
    /// Leading and trailing slashes are stripped and repeated slashes collapse.
    /// `.` components are dropped; `..` is rejected.
    pub fn new(path: &str) -> Result<Self, DevicePathError> {
        let mut parts = Vec::new();
        for part in path.split('/') {
            match part {
                "" | "." => {}
                ".." => {
                    return Err(DevicePathError {
                        path: path.to_string(),
                        reason: "parent components are not allowed",
                    })
                }
                p => parts.push(p),
            }
        }
        if parts.is_empty() {
            return Err(DevicePathError {
                path: path.to_string(),
                reason: "path is empty",
            });
        }
        Ok(Self(parts.join("/")))
    }

    /// Builds a device path from a relative host path.
    pub fn from_relative(path: &Path) -> Result<Self, DevicePathError> {
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(DevicePathError {
                        path: path.display().to_string(),
                        reason: "host path must be relative and must not escape its root",
                    })
                }
            }
        }
        Self::new(&parts.join("/"))
    }

    /// Returns the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends a relative path, returning a new device path.
    pub fn join(&self, rest: &str) -> Result<Self, DevicePathError> {
        Self::new(&format!("{}/{}", self.0, rest))
    }

    /// Joins an optional prefix directory with a relative path.
    pub fn under(prefix: Option<&DevicePath>, rest: &Path) -> Result<Self, DevicePathError> {
        let rel = Self::from_relative(rest)?;
        match prefix {
            Some(prefix) => prefix.join(rel.as_str()),
            None => Ok(rel),
        }
    }

    /// Returns the parent directory, or `None` for a top-level entry.
    pub fn parent(&self) -> Option<DevicePath> {
        self.0
            .rfind('/')
            .map(|idx| DevicePath(self.0[..idx].to_string()))
    }

    /// Returns all ancestor directories, nearest first, excluding the root.
    pub fn ancestors(&self) -> impl Iterator<Item = DevicePath> + '_ {
        let mut current = self.parent();
        std::iter::from_fn(move || {
            let next = current.take()?;
            current = next.parent();
            Some(next)
        })
    }

    /// Returns the final component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Returns the number of components (`a` is 1, `a/b` is 2).
    pub fn depth(&self) -> usize {
        self.0.split('/').count()
    }

    /// Returns `true` if `self` is `other` or lies inside it.
    pub fn starts_with(&self, other: &DevicePath) -> bool {
        self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0.as_bytes().get(other.0.len()) == Some(&b'/'))
    }

    /// Replaces the extension of the final component (`main.py` → `main.mpy`).
    ///
    /// `extension` may be given with or without the leading dot.
    pub fn with_extension(&self, extension: &str) -> DevicePath {
        let extension = extension.trim_start_matches('.');
        let name = self.file_name();
        let stem = match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        };
        let new_name = if extension.is_empty() {
            stem.to_string()
        } else {
            format!("{stem}.{extension}")
        };
        match self.parent() {
            Some(parent) => DevicePath(format!("{}/{}", parent.0, new_name)),
            None => DevicePath(new_name),
        }
    }

    /// Returns the path with a suffix appended to its final component.
    pub fn with_suffix(&self, suffix: &str) -> DevicePath {
        DevicePath(format!("{}{}", self.0, suffix))
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DevicePath({:?})", self.0)
    }
}

impl TryFrom<String> for DevicePath {
    type Error = DevicePathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DevicePath::new(&value)
    }
}

impl From<DevicePath> for String {
    fn from(path: DevicePath) -> Self {
        path.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> DevicePath {
        DevicePath::new(s).unwrap()
    }

    #[test]
    fn normalizes_slashes() {
        assert_eq!(p("/lib//aioble/").as_str(), "lib/aioble");
        assert_eq!(p("./main.py").as_str(), "main.py");
    }

    #[test]
    fn rejects_parent_and_empty() {
        assert!(DevicePath::new("../etc").is_err());
        assert!(DevicePath::new("/").is_err());
        assert!(DevicePath::new("").is_err());
    }

    #[test]
    fn parent_and_ancestors() {
        let path = p("lib/aioble/core.mpy");
        assert_eq!(path.parent(), Some(p("lib/aioble")));
        let ancestors: Vec<_> = path.ancestors().collect();
        assert_eq!(ancestors, vec![p("lib/aioble"), p("lib")]);
        assert!(p("main.py").parent().is_none());
        assert_eq!(p("main.py").ancestors().count(), 0);
    }

    #[test]
    fn depth_counts_components() {
        assert_eq!(p("a").depth(), 1);
        assert_eq!(p("a/b/c").depth(), 3);
    }

    #[test]
    fn starts_with_respects_component_boundaries() {
        assert!(p("lib/a.py").starts_with(&p("lib")));
        assert!(p("lib").starts_with(&p("lib")));
        assert!(!p("library/a.py").starts_with(&p("lib")));
    }

    #[test]
    fn with_extension_rewrites_last_component() {
        assert_eq!(p("lib/util.py").with_extension(".mpy"), p("lib/util.mpy"));
        assert_eq!(p("main.py").with_extension("mpy"), p("main.mpy"));
        assert_eq!(p("Makefile").with_extension("mpy"), p("Makefile.mpy"));
        assert_eq!(p("a.b/c.tar.gz").with_extension("x"), p("a.b/c.tar.x"));
    }

    #[test]
    fn from_relative_host_path() {
        let path = DevicePath::from_relative(Path::new("drivers/led.py")).unwrap();
        assert_eq!(path, p("drivers/led.py"));
        assert!(DevicePath::from_relative(Path::new("../x")).is_err());
    }

    #[test]
    fn under_prefix() {
        let prefix = p("lib");
        let joined = DevicePath::under(Some(&prefix), Path::new("aioble/core.py")).unwrap();
        assert_eq!(joined, p("lib/aioble/core.py"));
        let bare = DevicePath::under(None, Path::new("main.py")).unwrap();
        assert_eq!(bare, p("main.py"));
    }

    #[test]
    fn ordering_puts_directory_first() {
        let mut paths = vec![p("a/b/c"), p("a"), p("a/b")];
        paths.sort();
        assert_eq!(paths, vec![p("a"), p("a/b"), p("a/b/c")]);
    }

    #[test]
    fn serde_roundtrip_validates() {
        let json = serde_json::to_string(&p("lib/x.mpy")).unwrap();
        assert_eq!(json, "\"lib/x.mpy\"");
        let back: DevicePath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p("lib/x.mpy"));
        assert!(serde_json::from_str::<DevicePath>("\"../x\"").is_err());
    }
}
