//! Named pipeline hooks.
//!
//! A hook is a strategy object registered under a capability name and invoked
//! at fixed pipeline stages. Projects opt in with `[hooks] enabled = [...]`.

use std::collections::BTreeMap;
use std::path::Path;

use flint_common::DevicePath;
use flint_config::ProjectConfig;
use serde::Serialize;

use crate::error::BuildError;

/// Points in the pipeline where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// After the module graph is built, before compilation.
    BeforeBuild,
    /// After compilation succeeded, before the manifest is assembled.
    BeforeManifest,
    /// After a sync completed successfully.
    AfterSync,
}

/// A device file produced by a hook instead of a source module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Where the file goes on the device.
    pub path: DevicePath,
    /// File content.
    pub bytes: Vec<u8>,
    /// Name of the hook that produced it.
    pub origin: String,
}

/// State shared with hooks while they run.
pub struct HookContext<'a> {
    /// Project root directory.
    pub root: &'a Path,
    /// The project configuration.
    pub config: &'a ProjectConfig,
    generated: Vec<GeneratedFile>,
}

impl<'a> HookContext<'a> {
    /// Creates an empty context.
    pub fn new(root: &'a Path, config: &'a ProjectConfig) -> Self {
        Self {
            root,
            config,
            generated: Vec::new(),
        }
    }

    /// Adds a generated device file.
    pub fn emit(&mut self, path: DevicePath, bytes: Vec<u8>, origin: &str) {
        tracing::debug!(%path, origin, bytes = bytes.len(), "hook generated file");
        self.generated.push(GeneratedFile {
            path,
            bytes,
            origin: origin.to_string(),
        });
    }

    /// Files generated so far.
    pub fn generated(&self) -> &[GeneratedFile] {
        &self.generated
    }
}

/// A pluggable pipeline step.
pub trait BuildHook: Send + Sync {
    /// Capability name used in `[hooks] enabled`.
    fn name(&self) -> &str;

    /// Stages at which the hook wants to run.
    fn stages(&self) -> &[HookStage];

    /// Runs the hook for one stage.
    fn run(&self, stage: HookStage, ctx: &mut HookContext<'_>) -> Result<(), String>;
}

/// Registered hooks and the subset enabled for this project.
#[derive(Default)]
pub struct HookRegistry {
    available: BTreeMap<String, Box<dyn BuildHook>>,
    enabled: Vec<String>,
}

impl HookRegistry {
    /// Creates a registry containing the built-in hooks, none enabled.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(Box::new(AppInfoHook));
        registry
    }

    /// Creates the built-in registry and enables the hooks named in the config.
    pub fn from_config(config: &ProjectConfig) -> Result<Self, BuildError> {
        let mut registry = Self::with_builtins();
        registry.enable(&config.hooks.enabled)?;
        Ok(registry)
    }

    /// Registers a hook under its own name, replacing any previous one.
    pub fn register(&mut self, hook: Box<dyn BuildHook>) {
        self.available.insert(hook.name().to_string(), hook);
    }

    /// Enables hooks by name, in the given order.
    pub fn enable(&mut self, names: &[String]) -> Result<(), BuildError> {
        for name in names {
            if !self.available.contains_key(name) {
                return Err(BuildError::UnknownHook {
                    name: name.clone(),
                    available: self.available.keys().cloned().collect::<Vec<_>>().join(", "),
                });
            }
            if !self.enabled.contains(name) {
                self.enabled.push(name.clone());
            }
        }
        Ok(())
    }

    /// Names of enabled hooks, in run order.
    pub fn enabled(&self) -> &[String] {
        &self.enabled
    }

    /// Runs every enabled hook that asked for `stage`.
    pub fn run(&self, stage: HookStage, ctx: &mut HookContext<'_>) -> Result<(), BuildError> {
        for name in &self.enabled {
            let Some(hook) = self.available.get(name) else {
                continue;
            };
            if hook.stages().contains(&stage) {
                tracing::debug!(hook = %name, ?stage, "running hook");
                hook.run(stage, ctx).map_err(|reason| BuildError::Hook {
                    name: name.clone(),
                    reason,
                })?;
            }
        }
        Ok(())
    }
}

/// Device path of the file written by [`AppInfoHook`].
pub const APP_INFO_FILE: &str = "app_info.json";

/// Writes `app_info.json` with the project's name, version and author so the
/// running firmware can report what it is.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppInfoHook;

#[derive(Serialize)]
struct AppInfo<'a> {
    name: &'a str,
    version: &'a str,
    author: &'a str,
}

impl BuildHook for AppInfoHook {
    fn name(&self) -> &str {
        "app-info"
    }

    fn stages(&self) -> &[HookStage] {
        &[HookStage::BeforeManifest]
    }

    fn run(&self, _stage: HookStage, ctx: &mut HookContext<'_>) -> Result<(), String> {
        let project = &ctx.config.project;
        let info = AppInfo {
            name: &project.name,
            version: &project.version,
            author: &project.author,
        };
        let bytes = serde_json::to_vec_pretty(&info).map_err(|e| e.to_string())?;
        let path = DevicePath::new(APP_INFO_FILE).map_err(|e| e.to_string())?;
        ctx.emit(path, bytes, self.name());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_config::load_config_from_str;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config(hooks: &str) -> ProjectConfig {
        load_config_from_str(&format!(
            "[project]\nname = \"weather\"\nversion = \"1.0.0\"\nauthor = \"Ada\"\n\n[hooks]\nenabled = [{hooks}]\n"
        ))
        .unwrap()
    }

    #[test]
    fn app_info_generates_json() {
        let cfg = config("\"app-info\"");
        let registry = HookRegistry::from_config(&cfg).unwrap();
        let mut ctx = HookContext::new(Path::new("."), &cfg);
        registry.run(HookStage::BeforeBuild, &mut ctx).unwrap();
        assert!(ctx.generated().is_empty());
        registry.run(HookStage::BeforeManifest, &mut ctx).unwrap();

        let generated = ctx.generated();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].path.as_str(), "app_info.json");
        assert_eq!(generated[0].origin, "app-info");
        let value: serde_json::Value = serde_json::from_slice(&generated[0].bytes).unwrap();
        assert_eq!(value["name"], "weather");
        assert_eq!(value["version"], "1.0.0");
        assert_eq!(value["author"], "Ada");
    }

    #[test]
    fn disabled_hooks_do_not_run() {
        let cfg = config("");
        let registry = HookRegistry::from_config(&cfg).unwrap();
        let mut ctx = HookContext::new(Path::new("."), &cfg);
        registry.run(HookStage::BeforeManifest, &mut ctx).unwrap();
        assert!(ctx.generated().is_empty());
    }

    #[test]
    fn unknown_hook_rejected() {
        let cfg = config("\"frobnicate\"");
        let err = HookRegistry::from_config(&cfg).err().unwrap();
        assert!(matches!(err, BuildError::UnknownHook { ref name, .. } if name == "frobnicate"));
    }

    struct Counter {
        runs: Arc<AtomicUsize>,
    }

    impl BuildHook for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn stages(&self) -> &[HookStage] {
            &[HookStage::AfterSync]
        }

        fn run(&self, _stage: HookStage, _ctx: &mut HookContext<'_>) -> Result<(), String> {
            if self.runs.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err("ran twice".to_string());
            }
            Ok(())
        }
    }

    #[test]
    fn custom_hook_runs_at_its_stage_and_errors_propagate() {
        let cfg = config("");
        let runs = Arc::new(AtomicUsize::new(0));
        let mut registry = HookRegistry::with_builtins();
        registry.register(Box::new(Counter { runs: runs.clone() }));
        registry.enable(&["counter".to_string()]).unwrap();
        let mut ctx = HookContext::new(Path::new("."), &cfg);

        registry.run(HookStage::BeforeManifest, &mut ctx).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        registry.run(HookStage::AfterSync, &mut ctx).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let err = registry.run(HookStage::AfterSync, &mut ctx).unwrap_err();
        assert!(matches!(err, BuildError::Hook { ref name, .. } if name == "counter"));
    }
}
