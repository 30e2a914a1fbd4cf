//! Configuration file loading and validation.

use std::collections::BTreeSet;
use std::path::{Component, Path};

use flint_common::DevicePath;

use crate::error::ConfigError;
use crate::types::{DeviceConfig, ProjectConfig, SourceSet, TransportKind};

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "flint.toml";

/// Loads and validates `flint.toml` from a project directory.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `flint.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates required fields and cross-field consistency.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.project.name.is_empty() {
        return Err(ConfigError::MissingField("project.name".to_string()));
    }
    if config.project.version.is_empty() {
        return Err(ConfigError::MissingField("project.version".to_string()));
    }
    if config.target.platform.is_empty() {
        return Err(ConfigError::MissingField("target.platform".to_string()));
    }
    if config.compiler.program.is_empty() {
        return Err(ConfigError::MissingField("compiler.program".to_string()));
    }

    validate_relative("workspace.build", &config.workspace.build)?;
    validate_relative("workspace.packages", &config.workspace.packages)?;
    validate_device_dir("target.lib_dir", &config.target.lib_dir)?;
    for pattern in &config.workspace.ignore {
        validate_glob("workspace.ignore", pattern)?;
    }

    if config.build.jobs == Some(0) {
        return Err(ConfigError::ValidationError(
            "build.jobs must be at least 1".to_string(),
        ));
    }

    let mut names = BTreeSet::new();
    for (kind, set) in config
        .sources
        .iter()
        .map(|s| ("sources", s))
        .chain(config.resources.iter().map(|s| ("resources", s)))
    {
        validate_source_set(kind, set)?;
        if !names.insert(set.name.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "duplicate source set name '{}'",
                set.name
            )));
        }
    }

    for (name, spec) in &config.dependencies {
        if name.is_empty() {
            return Err(ConfigError::MissingField("dependencies.<name>".to_string()));
        }
        validate_constraint(name, spec.constraint())?;
        if let Some(path) = spec.path() {
            validate_relative(&format!("dependencies.{name}.path"), path)?;
        }
    }

    validate_device(&config.device)
}

fn validate_source_set(kind: &str, set: &SourceSet) -> Result<(), ConfigError> {
    if set.name.is_empty() {
        return Err(ConfigError::MissingField(format!("{kind}.name")));
    }
    validate_relative(&format!("{kind}.{}.root", set.name), &set.root)?;
    validate_device_dir(&format!("{kind}.{}.target", set.name), &set.target)?;
    for pattern in set.include.iter().chain(&set.exclude) {
        validate_glob(&format!("{kind}.{}", set.name), pattern)?;
    }
    Ok(())
}

fn validate_device(device: &DeviceConfig) -> Result<(), ConfigError> {
    if device.timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "device.timeout_ms must be positive".to_string(),
        ));
    }
    if device.backoff_max_ms < device.backoff_initial_ms {
        return Err(ConfigError::ValidationError(
            "device.backoff_max_ms must not be smaller than device.backoff_initial_ms"
                .to_string(),
        ));
    }
    if device.transport == TransportKind::Directory && device.mount.is_none() {
        return Err(ConfigError::MissingField("device.mount".to_string()));
    }
    Ok(())
}

/// Paths inside the workspace must be relative and must not climb out of it.
fn validate_relative(field: &str, path: &str) -> Result<(), ConfigError> {
    let p = Path::new(path);
    if p.is_absolute() {
        return Err(ConfigError::ValidationError(format!(
            "{field} must be relative to the project root, got '{path}'"
        )));
    }
    if p.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ConfigError::ValidationError(format!(
            "{field} must not leave the project root, got '{path}'"
        )));
    }
    Ok(())
}

/// Device directories may be empty (device root) or a valid device path.
fn validate_device_dir(field: &str, dir: &str) -> Result<(), ConfigError> {
    if dir.trim_matches('/').is_empty() {
        return Ok(());
    }
    DevicePath::new(dir)
        .map(|_| ())
        .map_err(|e| ConfigError::ValidationError(format!("{field}: {e}")))
}

fn validate_glob(field: &str, pattern: &str) -> Result<(), ConfigError> {
    glob::Pattern::new(pattern)
        .map(|_| ())
        .map_err(|e| ConfigError::ValidationError(format!("{field}: bad pattern '{pattern}': {e}")))
}

fn validate_constraint(name: &str, constraint: &str) -> Result<(), ConfigError> {
    if constraint == "latest" {
        return Ok(());
    }
    semver::VersionReq::parse(constraint)
        .map(|_| ())
        .map_err(|e| {
            ConfigError::ValidationError(format!(
                "dependency '{name}' has invalid version constraint '{constraint}': {e}"
            ))
        })
}
