//! Shared pipeline steps for CLI commands.
//!
//! `build` and `sync` both run the same front half: load the project, build
//! the module graph, compile what changed and assemble the manifest.

use std::path::{Path, PathBuf};

use flint_build::{
    materialize, BuildManifest, CompilationScheduler, CompileOutcome, Compiler, CompilerError,
    ExternalCompiler, HookContext, HookRegistry, HookStage, ManifestBuilder,
};
use flint_cache::ArtifactCache;
use flint_config::{ProjectConfig, CONFIG_FILE};
use flint_config::{load_config, load_config_file, load_lockfile, Lockfile};
use flint_graph::ModuleGraph;

use crate::GlobalArgs;

/// Walks up from `start` looking for the nearest directory containing `flint.toml`.
pub fn find_project_root(start: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).exists() {
            return Ok(current);
        }
        if !current.pop() {
            return Err(format!(
                "could not find {CONFIG_FILE} in {} or any parent directory",
                start.display()
            )
            .into());
        }
    }
}

/// Resolves the project root directory from global CLI args.
///
/// If `--config` is specified, uses that path (file → parent dir, dir → itself).
/// Otherwise walks up from the current directory looking for `flint.toml`.
pub fn resolve_project_root(global: &GlobalArgs) -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(ref config_path) = global.config {
        let p = PathBuf::from(config_path);
        if p.is_file() {
            Ok(p.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")))
        } else {
            Ok(p)
        }
    } else {
        find_project_root(&std::env::current_dir()?)
    }
}

/// A loaded project: its root, configuration and lock file.
pub struct Project {
    pub root: PathBuf,
    pub config: ProjectConfig,
    pub lock: Lockfile,
}

impl Project {
    /// Loads the project selected by the global arguments.
    pub fn load(global: &GlobalArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let root = resolve_project_root(global)?;
        let config = match global.config.as_deref().map(Path::new) {
            Some(path) if path.is_file() => load_config_file(path)?,
            _ => load_config(&root)?,
        };
        let lock = load_lockfile(&root)?;
        Ok(Self { root, config, lock })
    }
}

/// Output of a successful build.
pub struct Built {
    pub manifest: BuildManifest,
    pub cache: ArtifactCache,
}

/// Stands in for the external compiler when no module is compiled, so that
/// projects deploying only source do not need `mpy-cross` installed.
struct NoCompiler;

impl Compiler for NoCompiler {
    fn version(&self) -> &str {
        "none"
    }

    fn compile(
        &self,
        source: &Path,
        _source_name: &str,
        _platform: &str,
    ) -> Result<CompileOutcome, CompilerError> {
        Ok(CompileOutcome::Failed {
            status: None,
            diagnostics: format!("no compiler configured for {}", source.display()),
        })
    }
}

/// Builds the project: graph, compilation, manifest and the staged output tree.
///
/// Returns `None` when a module failed to compile; the failures have already
/// been reported.
pub fn build_project(
    project: &Project,
    global: &GlobalArgs,
) -> Result<Option<Built>, Box<dyn std::error::Error>> {
    let Project { root, config, lock } = project;
    let workspace = &config.workspace;

    if !global.quiet {
        eprintln!(
            "   Building {} v{}",
            config.project.name, config.project.version
        );
    }

    let graph = ModuleGraph::build(root, config, lock)?;
    tracing::debug!(modules = graph.len(), "module graph built");

    let cache = ArtifactCache::open(&workspace.cache_dir(root))?;
    let hooks = HookRegistry::from_config(config)?;
    let mut ctx = HookContext::new(root, config);
    hooks.run(HookStage::BeforeBuild, &mut ctx)?;

    let external;
    let compiler: &dyn Compiler = if graph.modules().any(|m| m.compile) {
        let scratch = workspace.build_dir(root).join("tmp");
        external = ExternalCompiler::from_config(&config.compiler, &scratch)?;
        &external
    } else {
        &NoCompiler
    };

    let jobs = global.jobs.or(config.build.jobs);
    let report =
        CompilationScheduler::new(compiler, &cache, config.target.platform.clone(), jobs)
            .run(&graph)?;

    if !report.is_success() {
        for (id, diagnostics) in report.failures() {
            eprintln!("error: failed to compile {id}");
            for line in diagnostics.lines() {
                eprintln!("  {line}");
            }
        }
        for (id, cause) in report.skips() {
            eprintln!("note: skipped {id} (depends on {cause})");
        }
        eprintln!(
            "error: build failed: {} failed, {} skipped",
            report.failed(),
            report.skipped()
        );
        return Ok(None);
    }

    if !global.quiet {
        eprintln!(
            "   Compiling {} modules ({} cached, {} verbatim)",
            report.compiled(),
            report.cache_hits(),
            report.verbatim()
        );
    }

    hooks.run(HookStage::BeforeManifest, &mut ctx)?;
    let manifest = ManifestBuilder::new(config, &cache).build(&graph, &report, ctx.generated())?;
    manifest.save(&workspace.manifest_file(root))?;
    let written = materialize(&manifest, &cache, &workspace.build_dir(root).join("device"))?;

    if !global.quiet {
        eprintln!(
            "    Finished {} files, {} bytes",
            written,
            manifest.total_size()
        );
    }

    Ok(Some(Built { manifest, cache }))
}
