//! Parallel, cache-aware compilation of a module graph.

use std::collections::BTreeMap;

use flint_cache::{ArtifactCache, ArtifactKey};
use flint_common::ContentHash;
use flint_graph::scan::slash_path;
use flint_graph::{Module, ModuleGraph, ModuleId};
use rayon::prelude::*;

use crate::compiler::{CompileOutcome, Compiler};
use crate::error::BuildError;

/// What happened to one module during a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    /// Compiled now and stored in the cache.
    Compiled {
        /// Cache key of the output.
        key: ArtifactKey,
        /// Hash of the compiled bytes.
        hash: ContentHash,
        /// Size of the compiled bytes.
        size: u64,
    },
    /// Output taken from the cache without running the compiler.
    CacheHit {
        /// Cache key of the output.
        key: ArtifactKey,
        /// Hash of the compiled bytes.
        hash: ContentHash,
        /// Size of the compiled bytes.
        size: u64,
    },
    /// Deployed as-is (resources, keep-source files, uncompiled sets).
    Verbatim,
    /// The compiler rejected the module.
    Failed {
        /// Compiler diagnostics.
        diagnostics: String,
    },
    /// Not attempted because a dependency failed.
    Skipped {
        /// The failed module that caused the skip.
        failed_dependency: ModuleId,
    },
}

impl ModuleOutcome {
    /// Returns `true` when the module has deployable output.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ModuleOutcome::Compiled { .. } | ModuleOutcome::CacheHit { .. } | ModuleOutcome::Verbatim
        )
    }

    /// Cache key of compiled output, if any.
    pub fn artifact_key(&self) -> Option<&ArtifactKey> {
        match self {
            ModuleOutcome::Compiled { key, .. } | ModuleOutcome::CacheHit { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Per-module results of one build, in module identity order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Outcome of every module in the graph.
    pub outcomes: BTreeMap<ModuleId, ModuleOutcome>,
}

impl BuildReport {
    fn count(&self, pred: impl Fn(&ModuleOutcome) -> bool) -> usize {
        self.outcomes.values().filter(|o| pred(o)).count()
    }

    /// Modules compiled in this build.
    pub fn compiled(&self) -> usize {
        self.count(|o| matches!(o, ModuleOutcome::Compiled { .. }))
    }

    /// Modules served from the cache.
    pub fn cache_hits(&self) -> usize {
        self.count(|o| matches!(o, ModuleOutcome::CacheHit { .. }))
    }

    /// Modules deployed verbatim.
    pub fn verbatim(&self) -> usize {
        self.count(|o| matches!(o, ModuleOutcome::Verbatim))
    }

    /// Modules the compiler rejected.
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ModuleOutcome::Failed { .. }))
    }

    /// Modules skipped because of a failed dependency.
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ModuleOutcome::Skipped { .. }))
    }

    /// Returns `true` when every module has deployable output.
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(ModuleOutcome::is_success)
    }

    /// Every compilation failure with its diagnostics.
    pub fn failures(&self) -> impl Iterator<Item = (&ModuleId, &str)> {
        self.outcomes.iter().filter_map(|(id, o)| match o {
            ModuleOutcome::Failed { diagnostics } => Some((id, diagnostics.as_str())),
            _ => None,
        })
    }

    /// Every skipped module with the failure that caused it.
    pub fn skips(&self) -> impl Iterator<Item = (&ModuleId, &ModuleId)> {
        self.outcomes.iter().filter_map(|(id, o)| match o {
            ModuleOutcome::Skipped { failed_dependency } => Some((id, failed_dependency)),
            _ => None,
        })
    }
}

/// Compiles a module graph in dependency order.
///
/// Modules are processed level by level: a level holds every module whose
/// dependencies all completed in earlier levels, and its compiler invocations
/// run concurrently on a bounded worker pool. A failed module never stops
/// independent modules; its dependents are skipped.
pub struct CompilationScheduler<'a> {
    compiler: &'a dyn Compiler,
    cache: &'a ArtifactCache,
    platform: String,
    jobs: usize,
}

impl<'a> CompilationScheduler<'a> {
    /// Creates a scheduler. `jobs` defaults to the available parallelism.
    pub fn new(
        compiler: &'a dyn Compiler,
        cache: &'a ArtifactCache,
        platform: impl Into<String>,
        jobs: Option<usize>,
    ) -> Self {
        let jobs = jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        Self {
            compiler,
            cache,
            platform: platform.into(),
            jobs: jobs.max(1),
        }
    }

    /// Builds every module of the graph.
    ///
    /// Returns an error only for conditions that make the whole build
    /// meaningless: cache corruption or a compiler that cannot be run.
    pub fn run(&self, graph: &ModuleGraph) -> Result<BuildReport, BuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| BuildError::ThreadPool {
                reason: e.to_string(),
            })?;

        let mut report = BuildReport::default();
        for level in graph.levels() {
            let mut ready: Vec<&Module> = Vec::new();
            for id in level {
                let Some(module) = graph.get(&id) else {
                    continue;
                };
                if let Some(failed) = failed_dependency(graph, &report, &id) {
                    tracing::debug!(module = %id, %failed, "skipping module");
                    report.outcomes.insert(
                        id,
                        ModuleOutcome::Skipped {
                            failed_dependency: failed,
                        },
                    );
                } else if !module.compile {
                    report.outcomes.insert(id, ModuleOutcome::Verbatim);
                } else {
                    ready.push(module);
                }
            }

            let results: Vec<(ModuleId, Result<ModuleOutcome, BuildError>)> = pool.install(|| {
                ready
                    .par_iter()
                    .map(|module| (module.id.clone(), self.build_module(module)))
                    .collect()
            });
            for (id, result) in results {
                report.outcomes.insert(id, result?);
            }
        }

        tracing::info!(
            compiled = report.compiled(),
            cache_hits = report.cache_hits(),
            verbatim = report.verbatim(),
            failed = report.failed(),
            skipped = report.skipped(),
            "build finished"
        );
        Ok(report)
    }

    /// Cache key of `module`'s compiled output.
    pub fn artifact_key(&self, module: &Module) -> ArtifactKey {
        ArtifactKey::new(module.hash, self.compiler.version(), self.platform.as_str())
            .with_source_name(source_name(module))
            .with_compiler_args(self.compiler.args())
    }

    fn build_module(&self, module: &Module) -> Result<ModuleOutcome, BuildError> {
        let key = self.artifact_key(module);
        if let Some(artifact) = self.cache.lookup(&key) {
            tracing::debug!(module = %module.id, "cache hit");
            return Ok(ModuleOutcome::CacheHit {
                hash: artifact.hash(),
                size: artifact.bytes.len() as u64,
                key,
            });
        }

        tracing::debug!(module = %module.id, "compiling");
        match self
            .compiler
            .compile(&module.source, &key.source_name, &self.platform)?
        {
            CompileOutcome::Success(bytes) => {
                self.cache.store(&key, &bytes)?;
                Ok(ModuleOutcome::Compiled {
                    hash: ContentHash::from_bytes(&bytes),
                    size: bytes.len() as u64,
                    key,
                })
            }
            CompileOutcome::Failed {
                status,
                diagnostics,
            } => {
                tracing::debug!(module = %module.id, ?status, "compilation failed");
                Ok(ModuleOutcome::Failed { diagnostics })
            }
        }
    }
}

/// Device-side name of a module's source, e.g. `lib/drivers/led.py`.
fn source_name(module: &Module) -> String {
    let rel = slash_path(&module.rel_path);
    match &module.device_dir {
        Some(dir) => format!("{dir}/{rel}"),
        None => rel,
    }
}

/// The failure a module inherits from its dependencies, if any.
fn failed_dependency(graph: &ModuleGraph, report: &BuildReport, id: &ModuleId) -> Option<ModuleId> {
    graph
        .dependencies(id)
        .iter()
        .find_map(|dep| match report.outcomes.get(dep)? {
            ModuleOutcome::Failed { .. } => Some(dep.clone()),
            ModuleOutcome::Skipped { failed_dependency } => Some(failed_dependency.clone()),
            _ => None,
        })
}
