//! The `flint.lock` pinned dependency set.
//!
//! Each `[[package]]` entry pins one vendored dependency to an exact version and
//! a directory inside the workspace. Dependency constraints in `flint.toml` are
//! resolved against these pins; nothing is fetched at build time.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the lock file in the project root.
pub const LOCK_FILE: &str = "flint.lock";

/// The parsed lock file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lockfile {
    /// Pinned packages.
    #[serde(default, rename = "package")]
    pub packages: Vec<LockedPackage>,
}

/// A single pinned dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    /// Dependency name, matching a key of `[dependencies]`.
    pub name: String,
    /// Exact pinned version.
    pub version: String,
    /// Vendored directory relative to the project root. Defaults to
    /// `<workspace.packages>/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Lockfile {
    /// Parses a lock file from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let lock: Lockfile = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("{LOCK_FILE}: {e}")))?;
        let mut seen = std::collections::BTreeSet::new();
        for pkg in &lock.packages {
            if pkg.name.is_empty() {
                return Err(ConfigError::MissingField("package.name".to_string()));
            }
            if !seen.insert(pkg.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "{LOCK_FILE} pins '{}' more than once",
                    pkg.name
                )));
            }
        }
        Ok(lock)
    }

    /// Looks up the pin for a dependency name.
    pub fn get(&self, name: &str) -> Option<&LockedPackage> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Pins `package`, replacing any previous pin of the same name. Pins stay
    /// sorted by name.
    pub fn pin(&mut self, package: LockedPackage) {
        self.packages.retain(|p| p.name != package.name);
        self.packages.push(package);
        self.packages.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Writes the lock file into a project directory.
    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        std::fs::write(project_dir.join(LOCK_FILE), self.to_toml_string()?)?;
        Ok(())
    }

    /// Serializes the lock file to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Loads `flint.lock` from a project directory.
///
/// A missing lock file is an empty pin set; dependencies then fail to resolve
/// with a precise error instead of a missing-file error here.
pub fn load_lockfile(project_dir: &Path) -> Result<Lockfile, ConfigError> {
    let path = project_dir.join(LOCK_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) => Lockfile::parse(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Lockfile::default()),
        Err(e) => Err(ConfigError::IoError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_packages() {
        let lock = Lockfile::parse(
            r#"
[[package]]
name = "logging"
version = "0.5.2"

[[package]]
name = "aioble"
version = "0.4.1"
path = "vendor/aioble"
"#,
        )
        .unwrap();
        assert_eq!(lock.packages.len(), 2);
        assert_eq!(lock.get("logging").unwrap().version, "0.5.2");
        assert_eq!(lock.get("aioble").unwrap().path.as_deref(), Some("vendor/aioble"));
        assert!(lock.get("missing").is_none());
    }

    #[test]
    fn duplicate_pin_rejected() {
        let err = Lockfile::parse(
            r#"
[[package]]
name = "logging"
version = "0.5.2"

[[package]]
name = "logging"
version = "0.6.0"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn missing_lockfile_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lock = load_lockfile(dir.path()).unwrap();
        assert!(lock.packages.is_empty());
    }

    #[test]
    fn toml_roundtrip() {
        let lock = Lockfile {
            packages: vec![LockedPackage {
                name: "logging".to_string(),
                version: "0.5.2".to_string(),
                path: None,
            }],
        };
        let text = lock.to_toml_string().unwrap();
        let back = Lockfile::parse(&text).unwrap();
        assert_eq!(back.packages, lock.packages);
    }

    #[test]
    fn pin_replaces_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = Lockfile::default();
        for (name, version) in [("logging", "0.5.2"), ("aioble", "0.4.1"), ("logging", "0.6.0")] {
            lock.pin(LockedPackage {
                name: name.to_string(),
                version: version.to_string(),
                path: None,
            });
        }
        lock.save(dir.path()).unwrap();

        let back = load_lockfile(dir.path()).unwrap();
        let pins: Vec<_> = back
            .packages
            .iter()
            .map(|p| (p.name.as_str(), p.version.as_str()))
            .collect();
        assert_eq!(pins, vec![("aioble", "0.4.1"), ("logging", "0.6.0")]);
    }
}
