//! Configuration types deserialized from `flint.toml`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ignore globs applied to every source and resource set unless overridden.
pub const DEFAULT_IGNORES: &[&str] = &[".git", ".vscode", "**/__pycache__", "**/*.pyc"];

/// Source files that the device runtime executes directly and must stay as source.
pub const DEFAULT_KEEP_SOURCE: &[&str] = &["main.py", "boot.py"];

/// The top-level project configuration parsed from `flint.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Core project metadata.
    pub project: ProjectMeta,
    /// Workspace directory layout.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Target platform and compilation settings.
    #[serde(default)]
    pub target: TargetConfig,
    /// External cross-compiler invocation.
    #[serde(default)]
    pub compiler: CompilerConfig,
    /// Build scheduling settings.
    #[serde(default)]
    pub build: BuildConfig,
    /// Device connection and transfer settings.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Python source sets (compiled unless disabled).
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceSet>,
    /// Static resource sets, always copied verbatim.
    #[serde(default)]
    pub resources: Vec<SourceSet>,
    /// External vendored dependencies, name → version constraint.
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    /// Named pipeline hooks to enable.
    #[serde(default)]
    pub hooks: HooksConfig,
}

/// Core project metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectMeta {
    /// The project name.
    pub name: String,
    /// The project version string.
    pub version: String,
    /// Project author.
    #[serde(default)]
    pub author: String,
}

/// Workspace layout, all paths relative to the project root unless absolute.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceConfig {
    /// Build output directory (manifest, staged output tree, device state).
    #[serde(default = "default_build_dir")]
    pub build: String,
    /// Artifact cache directory. Defaults to the per-user cache directory so that
    /// identical sources share compiled output across projects.
    #[serde(default)]
    pub cache: Option<String>,
    /// Directory holding vendored dependency packages.
    #[serde(default = "default_packages_dir")]
    pub packages: String,
    /// Glob patterns excluded from every scan.
    #[serde(default = "default_ignores")]
    pub ignore: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            build: default_build_dir(),
            cache: None,
            packages: default_packages_dir(),
            ignore: default_ignores(),
        }
    }
}

impl WorkspaceConfig {
    /// Returns the absolute build directory.
    pub fn build_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.build)
    }

    /// Returns the artifact cache directory.
    ///
    /// Relative paths resolve against the project root. Without an explicit
    /// setting the per-user cache directory is used, falling back to
    /// `<build>/cache` when the platform has none.
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        match &self.cache {
            Some(dir) => root.join(dir),
            None => dirs::cache_dir()
                .map(|d| d.join("flint"))
                .unwrap_or_else(|| self.build_dir(root).join("cache")),
        }
    }

    /// Returns the file holding the last confirmed device state.
    pub fn state_file(&self, root: &Path) -> PathBuf {
        self.build_dir(root).join("device-state.json")
    }

    /// Returns the path of the saved build manifest.
    pub fn manifest_file(&self, root: &Path) -> PathBuf {
        self.build_dir(root).join("manifest.json")
    }
}

/// Target platform settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Platform tag passed to the compiler and folded into cache keys.
    #[serde(default = "default_platform")]
    pub platform: String,
    /// Whether Python sources are cross-compiled at all.
    #[serde(default = "default_true")]
    pub compile: bool,
    /// Extension given to compiled modules on the device.
    #[serde(default = "default_compiled_extension")]
    pub compiled_extension: String,
    /// Device directory receiving vendored dependencies.
    #[serde(default = "default_lib_dir")]
    pub lib_dir: String,
    /// Source-root-relative files deployed as source even when compiling.
    #[serde(default = "default_keep_source")]
    pub keep_source: Vec<String>,
    /// Extra module names provided by the device firmware.
    #[serde(default)]
    pub builtin_modules: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            compile: true,
            compiled_extension: default_compiled_extension(),
            lib_dir: default_lib_dir(),
            keep_source: default_keep_source(),
            builtin_modules: Vec::new(),
        }
    }
}

/// External compiler invocation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerConfig {
    /// Compiler executable.
    #[serde(default = "default_compiler")]
    pub program: String,
    /// Extra arguments placed before the output and source arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Compiler version used in cache keys. Queried from the compiler when unset.
    #[serde(default)]
    pub version: Option<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: default_compiler(),
            args: Vec::new(),
            version: None,
        }
    }
}

/// Build scheduling settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildConfig {
    /// Maximum concurrent compiler invocations. Defaults to available parallelism.
    #[serde(default)]
    pub jobs: Option<usize>,
}

/// How the device is reached.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Drive the `mpremote` tool over a serial port.
    #[default]
    Mpremote,
    /// Device filesystem mounted on the host (USB mass storage).
    Directory,
}

/// Device connection and transfer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Transport used to reach the device.
    #[serde(default)]
    pub transport: TransportKind,
    /// Serial port (mpremote transport). Auto-detected when unset.
    #[serde(default)]
    pub port: Option<String>,
    /// Mount point of the device filesystem (directory transport).
    #[serde(default)]
    pub mount: Option<String>,
    /// Per-operation timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt of a failed operation.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    /// Backoff cap in milliseconds.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            port: None,
            mount: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl DeviceConfig {
    /// Returns the per-operation timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// A named set of files scanned from one root directory.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSet {
    /// Set name, unique among sources and resources.
    pub name: String,
    /// Directory scanned, relative to the project root.
    #[serde(default = "default_root")]
    pub root: String,
    /// Device directory the files are placed under (empty = device root).
    #[serde(default)]
    pub target: String,
    /// Glob patterns (relative to `root`) selecting files. Empty selects everything.
    #[serde(default)]
    pub include: Vec<String>,
    /// Glob patterns (relative to `root`) removed from the selection.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Whether Python files of this set are compiled.
    #[serde(default = "default_true")]
    pub compile: bool,
}

/// Specification of an external dependency.
///
/// Accepts either a bare constraint string (`logging = "^0.5"`) or a table
/// (`aioble = { version = "0.4", path = "vendor/aioble" }`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// A version constraint only; the location comes from the lock file.
    Version(String),
    /// A constraint plus an explicit vendored location overriding the lock file.
    Detailed {
        /// The version constraint.
        version: String,
        /// Vendored package directory, relative to the project root.
        #[serde(default)]
        path: Option<String>,
    },
}

impl DependencySpec {
    /// Returns the version constraint string.
    pub fn constraint(&self) -> &str {
        match self {
            DependencySpec::Version(v) => v,
            DependencySpec::Detailed { version, .. } => version,
        }
    }

    /// Returns the explicit vendored path, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            DependencySpec::Version(_) => None,
            DependencySpec::Detailed { path, .. } => path.as_deref(),
        }
    }
}

/// Pipeline hook selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksConfig {
    /// Capability names of hooks to run.
    #[serde(default)]
    pub enabled: Vec<String>,
}

fn default_sources() -> Vec<SourceSet> {
    vec![SourceSet {
        name: "app".to_string(),
        root: "src".to_string(),
        target: String::new(),
        include: Vec::new(),
        exclude: Vec::new(),
        compile: true,
    }]
}

fn default_build_dir() -> String {
    "build".to_string()
}

fn default_packages_dir() -> String {
    "packages".to_string()
}

fn default_ignores() -> Vec<String> {
    DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect()
}

fn default_platform() -> String {
    "micropython".to_string()
}

fn default_compiled_extension() -> String {
    ".mpy".to_string()
}

fn default_lib_dir() -> String {
    "lib".to_string()
}

fn default_keep_source() -> Vec<String> {
    DEFAULT_KEEP_SOURCE.iter().map(|s| s.to_string()).collect()
}

fn default_compiler() -> String {
    "mpy-cross".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_initial_ms() -> u64 {
    200
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

fn default_root() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}
