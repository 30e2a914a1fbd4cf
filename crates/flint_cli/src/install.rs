//! `flint install`: vendor a dependency into the workspace and pin it.
//!
//! Packages are fetched with `mpremote mip` into a staging directory under the
//! build directory (or copied from a local checkout with `--from`), moved to
//! `<workspace.packages>/<name>` and pinned in `flint.lock`. Builds then
//! resolve them like any other vendored dependency.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flint_config::{ConfigError, LockedPackage, CONFIG_FILE, LOCK_FILE};
use flint_sync::MpremoteTransport;

use crate::pipeline::Project;
use crate::{GlobalArgs, InstallArgs};

/// Index `mip` installs from unless `--index` says otherwise.
pub const DEFAULT_INDEX: &str = "https://micropython.org/pi/v2";

/// Downloads can take much longer than a single device operation.
const MIP_TIMEOUT: Duration = Duration::from_secs(300);

/// A `<name>@<version>` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRequest {
    /// Package name on the index.
    pub name: String,
    /// Exact version to pin.
    pub version: String,
}

impl PackageRequest {
    /// Parses `<name>@<version>`. The version is required so that the pin is
    /// exact.
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| {
            ConfigError::ValidationError(format!("invalid package '{spec}': {reason}"))
        };
        let (name, version) = spec
            .split_once('@')
            .ok_or_else(|| invalid("expected <name>@<version>"))?;
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(invalid("bad package name"));
        }
        if version.is_empty() || version.contains(char::is_whitespace) {
            return Err(invalid("bad version"));
        }
        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
        })
    }
}

/// Where the package files come from.
pub enum PackageSource {
    /// A local directory holding the package files.
    Local(PathBuf),
    /// A `mip` index, reached through a connected device.
    Mip {
        /// Device connection `mip` runs over.
        transport: MpremoteTransport,
        /// Package index URL.
        index: String,
    },
}

/// Result of [`install_package`].
#[derive(Debug, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The pinned version is already vendored.
    AlreadyInstalled,
    /// Files were vendored into `dir`.
    Installed {
        /// Files vendored.
        files: usize,
        /// The package directory.
        dir: PathBuf,
    },
}

/// Runs the `flint install` command.
pub fn run(args: &InstallArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let request = PackageRequest::parse(&args.package)?;
    let source = match &args.from {
        Some(dir) => PackageSource::Local(dir.clone()),
        None => {
            let port = args.port.clone().or_else(|| project.config.device.port.clone());
            PackageSource::Mip {
                transport: MpremoteTransport::new(port),
                index: args.index.clone(),
            }
        }
    };

    if !global.quiet {
        eprintln!("  Installing {}@{}", request.name, request.version);
    }
    match install_package(&project, &request, &source, args.reinstall)? {
        InstallOutcome::AlreadyInstalled => {
            if !global.quiet {
                eprintln!(
                    "  Up to date {}@{} is already installed",
                    request.name, request.version
                );
            }
        }
        InstallOutcome::Installed { files, dir } => {
            if !global.quiet {
                let shown = dir.strip_prefix(&project.root).unwrap_or(&dir);
                eprintln!("   Installed {files} files into {}", shown.display());
            }
            if !project.config.dependencies.contains_key(&request.name) && !global.quiet {
                eprintln!(
                    "        note: add `{} = \"{}\"` to [dependencies] in {CONFIG_FILE} to use it",
                    request.name, request.version
                );
            }
        }
    }
    Ok(0)
}

/// Vendors the requested package and pins it in `flint.lock`.
///
/// The previous copy is replaced only once the new files are fully staged, so
/// a failed fetch leaves the workspace as it was.
pub fn install_package(
    project: &Project,
    request: &PackageRequest,
    source: &PackageSource,
    reinstall: bool,
) -> Result<InstallOutcome, Box<dyn std::error::Error>> {
    let Project { root, config, lock } = project;
    let pinned = lock.get(&request.name);
    let target = match pinned.and_then(|p| p.path.as_deref()) {
        Some(path) => root.join(path),
        None => root.join(&config.workspace.packages).join(&request.name),
    };

    let current = pinned.is_some_and(|p| p.version == request.version);
    if current && target.is_dir() && !reinstall {
        tracing::info!(package = %request.name, version = %request.version, "already installed");
        return Ok(InstallOutcome::AlreadyInstalled);
    }

    let staging = config
        .workspace
        .build_dir(root)
        .join("install")
        .join(&request.name);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    match source {
        PackageSource::Local(dir) => {
            let dir = root.join(dir);
            if !dir.is_dir() {
                return Err(format!("package directory {} does not exist", dir.display()).into());
            }
            copy_tree(&dir, &staging)?;
        }
        PackageSource::Mip { transport, index } => {
            let package = format!("{}@{}", request.name, request.version);
            tracing::info!(%package, %index, "fetching with mip");
            transport.mip_install(&package, index, &staging, MIP_TIMEOUT)?;
        }
    }

    if fs::read_dir(&staging)?.next().is_none() {
        return Err(format!("{}@{} contains no files", request.name, request.version).into());
    }
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    let files = copy_tree(&staging, &target)?;
    fs::remove_dir_all(&staging)?;

    let mut lock = lock.clone();
    lock.pin(LockedPackage {
        name: request.name.clone(),
        version: request.version.clone(),
        path: pinned.and_then(|p| p.path.clone()),
    });
    lock.save(root)?;
    tracing::info!(
        package = %request.name,
        version = %request.version,
        files,
        "pinned in {LOCK_FILE}"
    );

    Ok(InstallOutcome::Installed { files, dir: target })
}

/// Copies the files below `from` into `to`, skipping hidden entries and
/// bytecode caches. Returns the number of files copied.
fn copy_tree(from: &Path, to: &Path) -> std::io::Result<usize> {
    fs::create_dir_all(to)?;
    let mut copied = 0;
    for item in fs::read_dir(from)? {
        let item = item?;
        let name = item.file_name();
        let skip = name
            .to_str()
            .is_some_and(|n| n.starts_with('.') || n == "__pycache__");
        if skip {
            continue;
        }
        let path = item.path();
        if path.is_dir() {
            copied += copy_tree(&path, &to.join(&name))?;
        } else {
            fs::copy(&path, to.join(&name))?;
            copied += 1;
        }
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_config::load_lockfile;
    use flint_graph::ModuleGraph;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn load(root: &Path) -> Project {
        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(root.join(CONFIG_FILE).display().to_string()),
            jobs: None,
        };
        Project::load(&global).unwrap()
    }

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            CONFIG_FILE,
            "[project]\nname = \"board\"\nversion = \"0.1.0\"\n\n\
             [target]\ncompile = false\n\n[dependencies]\nlogging = \"^0.5\"\n",
        );
        write(dir.path(), "src/main.py", "import logging\n");
        write(dir.path(), "checkout/logging/__init__.py", "LEVEL = 1\n");
        write(dir.path(), "checkout/logging/handlers.py", "pass\n");
        write(dir.path(), "checkout/logging/__pycache__/x.pyc", "junk");
        dir
    }

    fn request(spec: &str) -> PackageRequest {
        PackageRequest::parse(spec).unwrap()
    }

    fn local() -> PackageSource {
        PackageSource::Local(PathBuf::from("checkout"))
    }

    #[test]
    fn parses_name_and_version() {
        assert_eq!(
            request("aioble@0.4.1"),
            PackageRequest {
                name: "aioble".to_string(),
                version: "0.4.1".to_string()
            }
        );
        assert!(PackageRequest::parse("aioble").is_err());
        assert!(PackageRequest::parse("@1.0").is_err());
        assert!(PackageRequest::parse("aioble@").is_err());
        assert!(PackageRequest::parse("../etc@1.0").is_err());
    }

    #[test]
    fn vendors_and_pins_package() {
        let dir = setup();
        let project = load(dir.path());

        let outcome = install_package(&project, &request("logging@0.5.2"), &local(), false).unwrap();
        let vendored = dir.path().join("packages/logging");
        assert_eq!(
            outcome,
            InstallOutcome::Installed {
                files: 2,
                dir: vendored.clone()
            }
        );
        assert!(vendored.join("logging/handlers.py").is_file());
        assert!(!vendored.join("logging/__pycache__").exists());
        assert!(!dir.path().join("build/install/logging").exists());

        let lock = load_lockfile(dir.path()).unwrap();
        assert_eq!(lock.get("logging").unwrap().version, "0.5.2");

        // The pinned copy now resolves as a dependency.
        let project = load(dir.path());
        let graph = ModuleGraph::build(&project.root, &project.config, &project.lock).unwrap();
        assert_eq!(graph.external_dependencies().len(), 1);
    }

    #[test]
    fn same_version_is_not_reinstalled() {
        let dir = setup();
        install_package(&load(dir.path()), &request("logging@0.5.2"), &local(), false).unwrap();
        write(dir.path(), "checkout/logging/extra.py", "pass\n");

        let project = load(dir.path());
        let outcome = install_package(&project, &request("logging@0.5.2"), &local(), false).unwrap();
        assert_eq!(outcome, InstallOutcome::AlreadyInstalled);
        assert!(!dir.path().join("packages/logging/logging/extra.py").exists());

        install_package(&project, &request("logging@0.5.2"), &local(), true).unwrap();
        assert!(dir.path().join("packages/logging/logging/extra.py").is_file());
    }

    #[test]
    fn upgrade_replaces_files_and_pin() {
        let dir = setup();
        install_package(&load(dir.path()), &request("logging@0.5.2"), &local(), false).unwrap();
        fs::remove_file(dir.path().join("checkout/logging/handlers.py")).unwrap();

        install_package(&load(dir.path()), &request("logging@0.5.3"), &local(), false).unwrap();
        assert!(!dir.path().join("packages/logging/logging/handlers.py").exists());
        let lock = load_lockfile(dir.path()).unwrap();
        assert_eq!(lock.packages.len(), 1);
        assert_eq!(lock.get("logging").unwrap().version, "0.5.3");
    }

    #[test]
    fn missing_source_leaves_workspace_alone() {
        let dir = setup();
        let project = load(dir.path());
        let source = PackageSource::Local(PathBuf::from("nowhere"));
        assert!(install_package(&project, &request("logging@0.5.2"), &source, false).is_err());
        assert!(!dir.path().join("packages/logging").exists());
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[cfg(unix)]
    #[test]
    fn fetches_with_mip() {
        use std::os::unix::fs::PermissionsExt;

        let dir = setup();
        let tool = dir.path().join("fake-mpremote");
        // `mount -l <dir> + mip ...`: mip writes into the mounted directory.
        fs::write(&tool, "#!/bin/sh\nprintf 'LEVEL = 2\\n' > \"$3/logging.py\"\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        let source = PackageSource::Mip {
            transport: MpremoteTransport::new(None).with_program(tool.display().to_string()),
            index: DEFAULT_INDEX.to_string(),
        };

        let project = load(dir.path());
        install_package(&project, &request("logging@0.5.2"), &source, false).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("packages/logging/logging.py")).unwrap(),
            "LEVEL = 2\n"
        );
    }
}
