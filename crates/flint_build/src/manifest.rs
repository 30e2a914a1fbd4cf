//! The build manifest: every file destined for the device.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use flint_cache::{ArtifactCache, ArtifactKey};
use flint_common::{ContentHash, DevicePath};
use flint_config::ProjectConfig;
use flint_graph::{Module, ModuleGraph};
use serde::{Deserialize, Serialize};

use crate::error::{BuildError, ManifestError};
use crate::hooks::GeneratedFile;
use crate::scheduler::{BuildReport, ModuleOutcome};

/// Where the bytes of a manifest entry come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactRef {
    /// A cache object (compiled or generated output).
    Cache {
        /// Key of the cache object.
        key: ArtifactKey,
    },
    /// A source file copied verbatim.
    Source {
        /// Absolute source path.
        path: PathBuf,
    },
}

/// One file in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Device path.
    pub path: DevicePath,
    /// Hash of the bytes that belong at `path`.
    pub hash: ContentHash,
    /// Size of those bytes.
    pub size: u64,
    /// How to obtain the bytes.
    pub artifact: ArtifactRef,
    /// Module id or hook name that produced the entry.
    pub origin: String,
}

/// The files a successful build places on the device, sorted by device path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    /// Project name.
    pub project: String,
    /// Project version.
    pub version: String,
    /// Target platform tag.
    pub platform: String,
    /// Entries sorted by device path, paths unique.
    pub entries: Vec<ManifestEntry>,
}

impl BuildManifest {
    /// Looks up an entry by device path.
    pub fn get(&self, path: &DevicePath) -> Option<&ManifestEntry> {
        self.entries
            .binary_search_by(|e| e.path.cmp(path))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// Total size of all entries in bytes.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Reads the bytes of an entry and checks them against its hash.
    pub fn read_entry(entry: &ManifestEntry, cache: &ArtifactCache) -> Result<Vec<u8>, ManifestError> {
        let missing = |reason: String| ManifestError::MissingArtifact {
            path: entry.path.clone(),
            reason,
        };
        let bytes = match &entry.artifact {
            ArtifactRef::Cache { key } => {
                cache
                    .lookup(key)
                    .ok_or_else(|| missing(format!("cache object {key} is missing or damaged")))?
                    .bytes
            }
            ArtifactRef::Source { path } => std::fs::read(path)
                .map_err(|e| missing(format!("cannot read {}: {e}", path.display())))?,
        };
        if ContentHash::from_bytes(&bytes) != entry.hash {
            return Err(missing(
                "content changed since the build; rebuild first".to_string(),
            ));
        }
        Ok(bytes)
    }

    /// Saves the manifest as JSON, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let io_err = |e| ManifestError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let json = serde_json::to_string_pretty(self).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)
    }

    /// Loads a manifest saved by [`BuildManifest::save`].
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Assembles a [`BuildManifest`] from a successful build.
pub struct ManifestBuilder<'a> {
    config: &'a ProjectConfig,
    cache: &'a ArtifactCache,
}

impl<'a> ManifestBuilder<'a> {
    /// Creates a builder.
    pub fn new(config: &'a ProjectConfig, cache: &'a ArtifactCache) -> Self {
        Self { config, cache }
    }

    /// Maps every module and generated file to its device path.
    ///
    /// Compiled modules get the configured compiled extension; everything else
    /// keeps its relative path under the module's device directory. Generated
    /// files are stored in the cache so that sync can read every entry the same
    /// way.
    pub fn build(
        &self,
        graph: &ModuleGraph,
        report: &BuildReport,
        generated: &[GeneratedFile],
    ) -> Result<BuildManifest, BuildError> {
        let failed = report.failed() + report.skipped();
        if failed > 0 {
            return Err(ManifestError::IncompleteBuild { failed }.into());
        }

        let mut entries: BTreeMap<DevicePath, ManifestEntry> = BTreeMap::new();
        for module in graph.modules() {
            let Some(outcome) = report.outcomes.get(&module.id) else {
                return Err(ManifestError::InvalidPath {
                    module: module.id.to_string(),
                    reason: "module was not part of the build".to_string(),
                }
                .into());
            };
            let entry = self.module_entry(module, outcome)?;
            insert(&mut entries, entry)?;
        }

        for file in generated {
            let hash = ContentHash::from_bytes(&file.bytes);
            let key = ArtifactKey::generated(hash);
            self.cache.store(&key, &file.bytes)?;
            insert(
                &mut entries,
                ManifestEntry {
                    path: file.path.clone(),
                    hash,
                    size: file.bytes.len() as u64,
                    artifact: ArtifactRef::Cache { key },
                    origin: format!("hook '{}'", file.origin),
                },
            )?;
        }

        tracing::info!(entries = entries.len(), "manifest built");
        Ok(BuildManifest {
            project: self.config.project.name.clone(),
            version: self.config.project.version.clone(),
            platform: self.config.target.platform.clone(),
            entries: entries.into_values().collect(),
        })
    }

    fn module_entry(&self, module: &Module, outcome: &ModuleOutcome) -> Result<ManifestEntry, ManifestError> {
        let path = DevicePath::under(module.device_dir.as_ref(), &module.rel_path).map_err(|e| {
            ManifestError::InvalidPath {
                module: module.id.to_string(),
                reason: e.to_string(),
            }
        })?;
        let origin = module.id.to_string();
        match outcome {
            ModuleOutcome::Compiled { key, hash, size } | ModuleOutcome::CacheHit { key, hash, size } => {
                Ok(ManifestEntry {
                    path: path.with_extension(&self.config.target.compiled_extension),
                    hash: *hash,
                    size: *size,
                    artifact: ArtifactRef::Cache { key: key.clone() },
                    origin,
                })
            }
            ModuleOutcome::Verbatim => Ok(ManifestEntry {
                path,
                hash: module.hash,
                size: module.size,
                artifact: ArtifactRef::Source {
                    path: module.source.clone(),
                },
                origin,
            }),
            ModuleOutcome::Failed { .. } | ModuleOutcome::Skipped { .. } => {
                Err(ManifestError::IncompleteBuild { failed: 1 })
            }
        }
    }
}

fn insert(entries: &mut BTreeMap<DevicePath, ManifestEntry>, entry: ManifestEntry) -> Result<(), ManifestError> {
    if let Some(existing) = entries.get(&entry.path) {
        return Err(ManifestError::Conflict {
            path: entry.path.clone(),
            first: existing.origin.clone(),
            second: entry.origin,
        });
    }
    entries.insert(entry.path.clone(), entry);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_config::load_config_from_str;
    use flint_graph::{ModuleId, ModuleKind};

    struct Fixture {
        dir: tempfile::TempDir,
        cache: ArtifactCache,
        config: ProjectConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let cache = ArtifactCache::open(&dir.path().join("cache")).unwrap();
            let config = load_config_from_str(
                "[project]\nname = \"blinky\"\nversion = \"0.2.0\"\n\n[target]\nplatform = \"esp32\"\n",
            )
            .unwrap();
            Self { dir, cache, config }
        }

        fn module(&self, rel: &str, device_dir: Option<&str>, compile: bool) -> Module {
            let source = self.dir.path().join(rel.replace('/', "_"));
            std::fs::write(&source, rel).unwrap();
            Module {
                id: ModuleId::new(format!("src/{rel}")),
                kind: if compile {
                    ModuleKind::File
                } else {
                    ModuleKind::Resource
                },
                source,
                rel_path: PathBuf::from(rel),
                device_dir: device_dir.map(|d| DevicePath::new(d).unwrap()),
                hash: ContentHash::from_bytes(rel.as_bytes()),
                size: rel.len() as u64,
                compile,
                dependencies: Vec::new(),
                import_name: None,
            }
        }

        fn compiled(&self, module: &Module) -> ModuleOutcome {
            let bytes = format!("mpy:{}", module.id);
            let key = ArtifactKey::new(module.hash, "1.22.0", "esp32");
            self.cache.store(&key, bytes.as_bytes()).unwrap();
            ModuleOutcome::Compiled {
                key,
                hash: ContentHash::from_bytes(bytes.as_bytes()),
                size: bytes.len() as u64,
            }
        }
    }

    fn paths(manifest: &BuildManifest) -> Vec<&str> {
        manifest.entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn maps_modules_to_device_paths() {
        let fx = Fixture::new();
        let main = fx.module("main.py", None, false);
        let led = fx.module("drivers/led.py", None, true);
        let ext = fx.module("logging.py", Some("lib"), true);
        let mut report = BuildReport::default();
        report.outcomes.insert(main.id.clone(), ModuleOutcome::Verbatim);
        report.outcomes.insert(led.id.clone(), fx.compiled(&led));
        report.outcomes.insert(ext.id.clone(), fx.compiled(&ext));
        let graph = ModuleGraph::from_modules(vec![main, led, ext]).unwrap();

        let manifest = ManifestBuilder::new(&fx.config, &fx.cache)
            .build(&graph, &report, &[])
            .unwrap();
        assert_eq!(paths(&manifest), vec!["drivers/led.mpy", "lib/logging.mpy", "main.py"]);
        assert_eq!(manifest.project, "blinky");
        assert_eq!(manifest.platform, "esp32");

        for entry in &manifest.entries {
            let bytes = BuildManifest::read_entry(entry, &fx.cache).unwrap();
            assert_eq!(ContentHash::from_bytes(&bytes), entry.hash);
            assert_eq!(bytes.len() as u64, entry.size);
        }
    }

    #[test]
    fn conflicting_paths_rejected() {
        let fx = Fixture::new();
        let a = fx.module("util.py", Some("lib"), true);
        let mut b = fx.module("util.mpy", Some("lib"), false);
        b.id = ModuleId::new("assets/lib/util.mpy");
        let mut report = BuildReport::default();
        report.outcomes.insert(a.id.clone(), fx.compiled(&a));
        report.outcomes.insert(b.id.clone(), ModuleOutcome::Verbatim);
        let graph = ModuleGraph::from_modules(vec![a, b]).unwrap();

        let err = ManifestBuilder::new(&fx.config, &fx.cache)
            .build(&graph, &report, &[])
            .unwrap_err();
        match err {
            BuildError::Manifest(ManifestError::Conflict { path, first, second }) => {
                assert_eq!(path.as_str(), "lib/util.mpy");
                assert_eq!(first, "assets/lib/util.mpy");
                assert_eq!(second, "src/util.py");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn generated_files_are_cached_entries() {
        let fx = Fixture::new();
        let graph = ModuleGraph::from_modules(Vec::new()).unwrap();
        let generated = vec![GeneratedFile {
            path: DevicePath::new("app_info.json").unwrap(),
            bytes: b"{\"name\":\"blinky\"}".to_vec(),
            origin: "app-info".to_string(),
        }];
        let manifest = ManifestBuilder::new(&fx.config, &fx.cache)
            .build(&graph, &BuildReport::default(), &generated)
            .unwrap();
        let entry = &manifest.entries[0];
        assert!(matches!(entry.artifact, ArtifactRef::Cache { .. }));
        assert_eq!(
            BuildManifest::read_entry(entry, &fx.cache).unwrap(),
            b"{\"name\":\"blinky\"}"
        );
    }

    #[test]
    fn failed_build_has_no_manifest() {
        let fx = Fixture::new();
        let m = fx.module("bad.py", None, true);
        let mut report = BuildReport::default();
        report.outcomes.insert(
            m.id.clone(),
            ModuleOutcome::Failed {
                diagnostics: "boom".to_string(),
            },
        );
        let graph = ModuleGraph::from_modules(vec![m]).unwrap();
        let err = ManifestBuilder::new(&fx.config, &fx.cache)
            .build(&graph, &report, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::Manifest(ManifestError::IncompleteBuild { failed: 1 })
        ));
    }

    #[test]
    fn save_and_load() {
        let fx = Fixture::new();
        let m = fx.module("index.html", Some("www"), false);
        let mut report = BuildReport::default();
        report.outcomes.insert(m.id.clone(), ModuleOutcome::Verbatim);
        let graph = ModuleGraph::from_modules(vec![m]).unwrap();
        let manifest = ManifestBuilder::new(&fx.config, &fx.cache)
            .build(&graph, &report, &[])
            .unwrap();

        let path = fx.dir.path().join("build/manifest.json");
        manifest.save(&path).unwrap();
        let loaded = BuildManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert!(loaded.get(&DevicePath::new("www/index.html").unwrap()).is_some());
        assert!(loaded.get(&DevicePath::new("index.html").unwrap()).is_none());
    }

    #[test]
    fn changed_source_detected_on_read() {
        let fx = Fixture::new();
        let m = fx.module("index.html", None, false);
        let source = m.source.clone();
        let mut report = BuildReport::default();
        report.outcomes.insert(m.id.clone(), ModuleOutcome::Verbatim);
        let graph = ModuleGraph::from_modules(vec![m]).unwrap();
        let manifest = ManifestBuilder::new(&fx.config, &fx.cache)
            .build(&graph, &report, &[])
            .unwrap();
        std::fs::write(source, "edited after build").unwrap();
        let err = BuildManifest::read_entry(&manifest.entries[0], &fx.cache).unwrap_err();
        assert!(matches!(err, ManifestError::MissingArtifact { .. }));
    }
}
