//! Resolution of external dependency specs against the lock file.

use std::path::{Path, PathBuf};

use flint_config::{Lockfile, ProjectConfig, CONFIG_FILE, LOCK_FILE};
use semver::{Version, VersionReq};

use crate::error::GraphError;

/// An external dependency matched to its pinned, vendored copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    /// Dependency name.
    pub name: String,
    /// The pinned version that satisfied the constraint.
    pub version: Version,
    /// Absolute vendored package directory.
    pub dir: PathBuf,
}

/// Resolves every `[dependencies]` entry through `flint.lock`.
///
/// The vendored directory is taken from the dependency's own `path`, then from
/// the lock entry, then defaults to `<workspace.packages>/<name>`.
pub fn resolve_dependencies(
    root: &Path,
    config: &ProjectConfig,
    lock: &Lockfile,
) -> Result<Vec<ResolvedDependency>, GraphError> {
    let mut resolved = Vec::with_capacity(config.dependencies.len());
    for (name, spec) in &config.dependencies {
        let unresolved = |reason: String| GraphError::UnresolvedDependency {
            module: CONFIG_FILE.to_string(),
            dependency: name.clone(),
            reason,
        };

        let req = parse_constraint(spec.constraint()).map_err(|e| {
            unresolved(format!("invalid constraint '{}': {e}", spec.constraint()))
        })?;
        let pin = lock
            .get(name)
            .ok_or_else(|| unresolved(format!("not pinned in {LOCK_FILE}")))?;
        let version = parse_pinned_version(&pin.version).map_err(|e| {
            unresolved(format!("pinned version '{}' is not a version: {e}", pin.version))
        })?;
        if !req.matches(&version) {
            return Err(unresolved(format!(
                "pinned version {version} does not satisfy '{}'",
                spec.constraint()
            )));
        }

        let dir = match spec.path().or(pin.path.as_deref()) {
            Some(path) => root.join(path),
            None => root.join(&config.workspace.packages).join(name),
        };
        if !dir.is_dir() {
            return Err(unresolved(format!(
                "vendored directory {} does not exist",
                dir.display()
            )));
        }

        tracing::debug!(dependency = %name, %version, dir = %dir.display(), "resolved dependency");
        resolved.push(ResolvedDependency {
            name: name.clone(),
            version,
            dir,
        });
    }
    Ok(resolved)
}

/// `latest` accepts any pinned version.
fn parse_constraint(constraint: &str) -> Result<VersionReq, semver::Error> {
    if constraint == "latest" {
        Ok(VersionReq::STAR)
    } else {
        VersionReq::parse(constraint)
    }
}

/// Package indexes commonly publish versions like `0.5` or `1`; pad them to
/// three components before parsing.
fn parse_pinned_version(version: &str) -> Result<Version, semver::Error> {
    let core_len = version.find(['-', '+']).unwrap_or(version.len());
    let dots = version[..core_len].matches('.').count();
    let padded = match dots {
        0 => format!("{}.0.0{}", &version[..core_len], &version[core_len..]),
        1 => format!("{}.0{}", &version[..core_len], &version[core_len..]),
        _ => version.to_string(),
    };
    Version::parse(&padded)
}
