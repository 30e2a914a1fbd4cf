//! End-to-end: scan, compile, assemble a manifest, plan and sync to an
//! in-memory device.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use flint_build::{
    BuildManifest, CompilationScheduler, CompileOutcome, Compiler, CompilerError, ManifestBuilder,
};
use flint_cache::ArtifactCache;
use flint_common::DevicePath;
use flint_config::{load_config, Lockfile};
use flint_graph::{GraphError, ModuleGraph, ModuleId};
use flint_sync::{
    plan, DeviceState, DeviceSyncExecutor, DeviceTransport, Fault, MemoryTransport, RetryPolicy,
    SyncError, SyncOp,
};

struct CountingCompiler {
    calls: AtomicUsize,
}

impl CountingCompiler {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Compiler for CountingCompiler {
    fn version(&self) -> &str {
        "test-1.0"
    }

    fn compile(
        &self,
        source: &Path,
        _source_name: &str,
        platform: &str,
    ) -> Result<CompileOutcome, CompilerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = std::fs::read(source).map_err(|e| CompilerError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let mut out = format!("mpy[{platform}]:").into_bytes();
        out.extend(text);
        Ok(CompileOutcome::Success(out))
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "flint.toml",
        "[project]\nname = \"demo\"\nversion = \"0.1.0\"\n\n[workspace]\ncache = \".cache\"\n",
    );
    for (rel, content) in files {
        write(dir.path(), rel, content);
    }
    dir
}

fn sample_project() -> tempfile::TempDir {
    project(&[
        ("src/main.py", "import app\napp.run()\n"),
        ("src/app.py", "from lib import helpers\n\ndef run():\n    helpers.blink()\n"),
        ("src/lib/__init__.py", "# package\n"),
        ("src/lib/helpers.py", "def blink():\n    pass\n"),
        ("src/www/index.html", "<html></html>"),
    ])
}

fn open_cache(root: &Path) -> ArtifactCache {
    ArtifactCache::open(&root.join(".cache")).unwrap()
}

fn build(
    root: &Path,
    compiler: &CountingCompiler,
    cache: &ArtifactCache,
) -> Result<(flint_build::BuildReport, BuildManifest), GraphError> {
    let config = load_config(root).unwrap();
    let graph = ModuleGraph::build(root, &config, &Lockfile::default())?;
    let report = CompilationScheduler::new(compiler, cache, config.target.platform.clone(), Some(2))
        .run(&graph)
        .unwrap();
    assert!(report.is_success());
    let manifest = ManifestBuilder::new(&config, cache)
        .build(&graph, &report, &[])
        .unwrap();
    Ok((report, manifest))
}

fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new(max_retries).with_initial_delay(Duration::ZERO)
}

fn sync(
    device: &mut MemoryTransport,
    cache: &ArtifactCache,
    state_file: &Path,
    manifest: &BuildManifest,
) -> Result<DeviceState, SyncError> {
    let mut state = DeviceState::load(state_file)?.unwrap_or_default();
    let sync_plan = plan(manifest, Some(&state));
    DeviceSyncExecutor::new(device, cache, state_file)
        .with_policy(fast_policy(3))
        .execute(&sync_plan, &mut state)?;
    Ok(state)
}

fn path(s: &str) -> DevicePath {
    DevicePath::new(s).unwrap()
}

#[test]
fn unchanged_sources_rebuild_from_cache() {
    let dir = sample_project();
    let cache = open_cache(dir.path());
    let compiler = CountingCompiler::new();

    let (first, manifest1) = build(dir.path(), &compiler, &cache).unwrap();
    let compiled = first.compiled();
    assert!(compiled > 0);
    assert_eq!(compiler.calls(), compiled);

    let (second, manifest2) = build(dir.path(), &compiler, &cache).unwrap();
    assert_eq!(second.compiled(), 0);
    assert_eq!(second.cache_hits(), compiled);
    assert_eq!(compiler.calls(), compiled, "no compiler invocations the second time");
    assert_eq!(manifest1, manifest2);
}

#[test]
fn sync_is_idempotent_and_survives_rescan() {
    let dir = sample_project();
    let cache = open_cache(dir.path());
    let compiler = CountingCompiler::new();
    let state_file = dir.path().join("build/device-state.json");
    let mut device = MemoryTransport::new();

    let (_, manifest) = build(dir.path(), &compiler, &cache).unwrap();
    let paths: Vec<&str> = manifest.entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(
        paths,
        vec!["app.mpy", "lib/__init__.mpy", "lib/helpers.mpy", "main.py", "www/index.html"]
    );

    sync(&mut device, &cache, &state_file, &manifest).unwrap();
    assert_eq!(
        device.file(&path("main.py")),
        Some(b"import app\napp.run()\n".to_vec())
    );
    assert_eq!(
        device.file(&path("lib/helpers.mpy")),
        Some(b"mpy[micropython]:def blink():\n    pass\n".to_vec())
    );

    // second sync with no source change
    let (_, manifest) = build(dir.path(), &compiler, &cache).unwrap();
    let state = DeviceState::load(&state_file).unwrap().unwrap();
    assert!(plan(&manifest, Some(&state)).is_empty());

    // state rebuilt from what is actually on the device
    let listing = device.list_files(Duration::from_secs(1)).unwrap();
    let rescanned = DeviceState::from_listing(&listing, None);
    assert!(plan(&manifest, Some(&rescanned)).is_empty());
}

#[test]
fn one_changed_file_is_one_update() {
    let dir = sample_project();
    let cache = open_cache(dir.path());
    let compiler = CountingCompiler::new();
    let state_file = dir.path().join("build/device-state.json");
    let mut device = MemoryTransport::new();

    let (_, manifest) = build(dir.path(), &compiler, &cache).unwrap();
    sync(&mut device, &cache, &state_file, &manifest).unwrap();

    write(dir.path(), "src/lib/helpers.py", "def blink():\n    print('on')\n");
    let calls_before = compiler.calls();
    let (_, manifest) = build(dir.path(), &compiler, &cache).unwrap();
    assert_eq!(compiler.calls(), calls_before + 1);

    let state = DeviceState::load(&state_file).unwrap().unwrap();
    let next = plan(&manifest, Some(&state));
    assert_eq!(next.len(), 1);
    match &next.ops[0] {
        SyncOp::Update { entry } => assert_eq!(entry.path, path("lib/helpers.mpy")),
        other => panic!("expected an update, got {other}"),
    }
}

/// Fails the third of five writes for good, then resumes once the device recovers.
fn resume_after_failed_write(mut device: MemoryTransport) {
    let dir = project(&[
        ("src/a.py", "A = 1\n"),
        ("src/b.py", "B = 2\n"),
        ("src/c.py", "C = 3\n"),
        ("src/d.py", "D = 4\n"),
        ("src/e.py", "E = 5\n"),
    ]);
    let cache = open_cache(dir.path());
    let compiler = CountingCompiler::new();
    let state_file = dir.path().join("build/device-state.json");
    let handle = device.clone();

    let (_, manifest) = build(dir.path(), &compiler, &cache).unwrap();
    let first_plan = plan(&manifest, None);
    assert_eq!(first_plan.len(), 5);
    assert_eq!(first_plan.ops[2].path(), &path("c.mpy"));

    // every attempt on the third operation times out
    handle.inject(&path("c.mpy"), Fault::Timeout, 100);
    let err = sync(&mut device, &cache, &state_file, &manifest).unwrap_err();
    match err {
        SyncError::Failed {
            path: failed,
            attempts,
            cause,
        } => {
            assert_eq!(failed, path("c.mpy"));
            assert_eq!(attempts, 4);
            assert!(cause.is_timeout());
        }
        other => panic!("unexpected error {other}"),
    }

    let state = DeviceState::load(&state_file).unwrap().unwrap();
    assert_eq!(
        state.entries.keys().map(DevicePath::as_str).collect::<Vec<_>>(),
        vec!["a.mpy", "b.mpy"]
    );
    let resumed = plan(&manifest, Some(&state));
    assert_eq!(resumed.ops, first_plan.ops[2..].to_vec());

    handle.clear_faults();
    sync(&mut device, &cache, &state_file, &manifest).unwrap();
    let state = DeviceState::load(&state_file).unwrap().unwrap();
    assert!(plan(&manifest, Some(&state)).is_empty());
    assert_eq!(handle.file_paths().len(), 5);
}

#[test]
fn failed_operation_resumes_on_next_sync() {
    resume_after_failed_write(MemoryTransport::new());
}

#[test]
fn failed_operation_resumes_on_size_only_device() {
    resume_after_failed_write(MemoryTransport::size_only());
}

#[test]
fn same_size_edit_is_not_lost_on_size_only_device() {
    let dir = project(&[("src/cfg.py", "MODE = 1\n")]);
    let cache = open_cache(dir.path());
    let compiler = CountingCompiler::new();
    let state_file = dir.path().join("build/device-state.json");
    let mut device = MemoryTransport::size_only();
    let handle = device.clone();

    let (_, manifest) = build(dir.path(), &compiler, &cache).unwrap();
    sync(&mut device, &cache, &state_file, &manifest).unwrap();
    let before = handle.file(&path("cfg.mpy")).unwrap();

    write(dir.path(), "src/cfg.py", "MODE = 2\n");
    let (_, manifest) = build(dir.path(), &compiler, &cache).unwrap();
    assert_eq!(manifest.entries[0].size, before.len() as u64);

    handle.inject(&path("cfg.mpy"), Fault::Timeout, 100);
    assert!(sync(&mut device, &cache, &state_file, &manifest).is_err());
    assert_eq!(handle.file(&path("cfg.mpy")), Some(before));
    let state = DeviceState::load(&state_file).unwrap().unwrap();
    assert_eq!(plan(&manifest, Some(&state)).len(), 1);

    handle.clear_faults();
    sync(&mut device, &cache, &state_file, &manifest).unwrap();
    let state = DeviceState::load(&state_file).unwrap().unwrap();
    assert!(plan(&manifest, Some(&state)).is_empty());
    assert!(handle.file(&path("cfg.mpy")).unwrap().ends_with(b"MODE = 2\n"));
}

#[test]
fn import_cycle_stops_before_compiling() {
    let dir = project(&[
        ("src/main.py", "import a\n"),
        ("src/a.py", "import b\n"),
        ("src/b.py", "import a\n"),
    ]);
    let cache = open_cache(dir.path());
    let compiler = CountingCompiler::new();

    let err = build(dir.path(), &compiler, &cache).unwrap_err();
    match err {
        GraphError::CyclicDependency { cycle } => {
            assert_eq!(cycle, vec![ModuleId::new("src/a.py"), ModuleId::new("src/b.py")]);
        }
        other => panic!("expected a cycle, got {other}"),
    }
    assert_eq!(compiler.calls(), 0);
}
