//! The project module graph.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::path::{Path, PathBuf};

use flint_common::{ContentHash, DevicePath};
use flint_config::{Lockfile, ProjectConfig, SourceSet};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::GraphError;
use crate::imports::{parse_imports, ImportStmt};
use crate::module::{import_name, Module, ModuleId, ModuleKind};
use crate::resolve::{resolve_dependencies, ResolvedDependency};
use crate::scan::{scan_dir, slash_path, ScanFilter};

/// Module names provided by MicroPython firmware. Imports of these never need
/// a project module. `target.builtin_modules` extends the list per board.
pub const DEFAULT_BUILTINS: &[&str] = &[
    "__future__",
    "_thread",
    "array",
    "asyncio",
    "binascii",
    "bluetooth",
    "builtins",
    "cmath",
    "collections",
    "cryptolib",
    "deflate",
    "errno",
    "framebuf",
    "gc",
    "hashlib",
    "heapq",
    "io",
    "json",
    "machine",
    "math",
    "micropython",
    "network",
    "os",
    "platform",
    "random",
    "re",
    "select",
    "socket",
    "ssl",
    "struct",
    "sys",
    "time",
    "uasyncio",
    "ubinascii",
    "ucollections",
    "uctypes",
    "uerrno",
    "uhashlib",
    "uheapq",
    "uio",
    "ujson",
    "umachine",
    "uos",
    "urandom",
    "ure",
    "uselect",
    "usocket",
    "ussl",
    "ustruct",
    "usys",
    "utime",
    "uzlib",
    "vfs",
    "websocket",
    "zlib",
];

/// Project modules and their static "depends on" edges.
///
/// The graph is acyclic and every edge points at a module inside the graph;
/// both are checked on construction.
#[derive(Debug)]
pub struct ModuleGraph {
    modules: BTreeMap<ModuleId, Module>,
    graph: DiGraph<ModuleId, ()>,
    nodes: BTreeMap<ModuleId, NodeIndex>,
    external: Vec<ResolvedDependency>,
}

impl ModuleGraph {
    /// Scans the project rooted at `root`, resolves imports and external
    /// dependencies, and builds the graph.
    pub fn build(root: &Path, config: &ProjectConfig, lock: &Lockfile) -> Result<Self, GraphError> {
        let external = resolve_dependencies(root, config, lock)?;
        let mut scanner = Scanner::new(root, config);
        for set in &config.sources {
            scanner.add_set(set, false)?;
        }
        for set in &config.resources {
            scanner.add_set(set, true)?;
        }
        for dep in &external {
            scanner.add_dependency(dep)?;
        }
        let modules = scanner.resolve_imports()?;
        tracing::info!(
            modules = modules.len(),
            dependencies = external.len(),
            "scanned project"
        );
        let mut graph = Self::from_modules(modules)?;
        graph.external = external;
        Ok(graph)
    }

    /// Builds a graph from already-constructed modules.
    ///
    /// Fails if a dependency names a module that is not present or if the
    /// modules form a cycle.
    pub fn from_modules(modules: impl IntoIterator<Item = Module>) -> Result<Self, GraphError> {
        let modules: BTreeMap<ModuleId, Module> =
            modules.into_iter().map(|m| (m.id.clone(), m)).collect();

        let mut graph = DiGraph::new();
        let mut nodes = BTreeMap::new();
        for id in modules.keys() {
            nodes.insert(id.clone(), graph.add_node(id.clone()));
        }
        for module in modules.values() {
            for dep in &module.dependencies {
                let Some(&to) = nodes.get(dep) else {
                    return Err(GraphError::UnresolvedDependency {
                        module: module.id.to_string(),
                        dependency: dep.to_string(),
                        reason: "not part of the module graph".to_string(),
                    });
                };
                graph.add_edge(nodes[&module.id], to, ());
            }
        }

        if let Some(cycle) = find_cycle(&modules) {
            return Err(GraphError::CyclicDependency { cycle });
        }

        Ok(Self {
            modules,
            graph,
            nodes,
            external: Vec::new(),
        })
    }

    /// Returns the number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if the project has no modules.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Looks up a module.
    pub fn get(&self, id: &ModuleId) -> Option<&Module> {
        self.modules.get(id)
    }

    /// Iterates over all modules in identity order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// External dependencies resolved while building the graph.
    pub fn external_dependencies(&self) -> &[ResolvedDependency] {
        &self.external
    }

    /// Direct dependencies of a module, in declaration order.
    pub fn dependencies(&self, id: &ModuleId) -> &[ModuleId] {
        self.modules
            .get(id)
            .map(|m| m.dependencies.as_slice())
            .unwrap_or(&[])
    }

    /// Modules that directly import `id`, in identity order.
    pub fn dependents(&self, id: &ModuleId) -> Vec<&ModuleId> {
        let Some(&idx) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut dependents: Vec<&ModuleId> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| &self.graph[n])
            .collect();
        dependents.sort();
        dependents
    }

    /// Returns every module after all of its dependencies.
    ///
    /// Among modules that are ready at the same time the smallest identity comes
    /// first, so the order depends only on the graph, never on scan order.
    pub fn topological_order(&self) -> Vec<ModuleId> {
        let mut pending: HashMap<&ModuleId, usize> = self
            .modules
            .iter()
            .map(|(id, m)| (id, m.dependencies.len()))
            .collect();
        let mut ready: BinaryHeap<Reverse<&ModuleId>> = pending
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(self.modules.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id.clone());
            for dependent in self.dependents(id) {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(dependent));
                    }
                }
            }
        }
        order
    }

    /// Groups modules into levels: level 0 has no dependencies, and every module
    /// sits one level above its deepest dependency. Each level is sorted.
    pub fn levels(&self) -> Vec<Vec<ModuleId>> {
        let mut depth: HashMap<&ModuleId, usize> = HashMap::new();
        let mut levels: Vec<Vec<ModuleId>> = Vec::new();
        for id in self.topological_order() {
            let level = self
                .dependencies(&id)
                .iter()
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            let key = self.modules.get_key_value(&id).map(|(k, _)| k);
            if let Some(key) = key {
                depth.insert(key, level);
            }
            levels[level].push(id);
        }
        for level in &mut levels {
            level.sort();
        }
        levels
    }
}

/// Depth-first search with an explicit recursion stack. Returns the modules on
/// the first cycle found, starting from the module where the cycle was entered.
fn find_cycle(modules: &BTreeMap<ModuleId, Module>) -> Option<Vec<ModuleId>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        OnStack,
        Done,
    }

    let mut marks: HashMap<&ModuleId, Mark> = HashMap::new();
    for start in modules.keys() {
        if marks.contains_key(start) {
            continue;
        }
        marks.insert(start, Mark::OnStack);
        let mut stack: Vec<(&ModuleId, usize)> = vec![(start, 0)];
        while let Some((id, next)) = stack.last_mut() {
            let id: &ModuleId = *id;
            let deps = &modules[id].dependencies;
            if *next < deps.len() {
                let dep = &deps[*next];
                *next += 1;
                match marks.get(dep) {
                    Some(Mark::OnStack) => {
                        let pos = stack.iter().position(|(m, _)| *m == dep).unwrap_or(0);
                        return Some(stack[pos..].iter().map(|(m, _)| (*m).clone()).collect());
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(dep, Mark::OnStack);
                        stack.push((dep, 0));
                    }
                }
            } else {
                marks.insert(id, Mark::Done);
                stack.pop();
            }
        }
    }
    None
}

/// Collects modules from every configured location.
struct Scanner<'a> {
    root: &'a Path,
    config: &'a ProjectConfig,
    skip_dirs: Vec<PathBuf>,
    modules: BTreeMap<ModuleId, Module>,
    texts: BTreeMap<ModuleId, String>,
    names: BTreeMap<String, ModuleId>,
}

impl<'a> Scanner<'a> {
    fn new(root: &'a Path, config: &'a ProjectConfig) -> Self {
        let skip_dirs = vec![
            config.workspace.build_dir(root),
            root.join(&config.workspace.packages),
            config.workspace.cache_dir(root),
        ];
        Self {
            root,
            config,
            skip_dirs,
            modules: BTreeMap::new(),
            texts: BTreeMap::new(),
            names: BTreeMap::new(),
        }
    }

    fn add_set(&mut self, set: &SourceSet, resource: bool) -> Result<(), GraphError> {
        let set_root = self.root.join(&set.root);
        let filter = ScanFilter::new(&set.include, &set.exclude, &self.config.workspace.ignore)?
            .skip_dirs(self.skip_dirs.iter().cloned());
        let device_dir = device_dir(&set.target, &set_root)?;
        let config = self.config;
        let target = &config.target;

        for file in scan_dir(&set_root, &filter)? {
            let is_python = !resource && file.rel_path.extension().is_some_and(|e| e == "py");
            let kind = if !is_python {
                ModuleKind::Resource
            } else if file.rel_path.file_name().is_some_and(|n| n == "__init__.py") {
                ModuleKind::Package
            } else {
                ModuleKind::File
            };
            let compile = is_python
                && target.compile
                && set.compile
                && !target.keep_source.contains(&slash_path(&file.rel_path));
            let names = if is_python {
                import_name(&file.rel_path)
            } else {
                None
            };
            self.add_file(file.path, file.rel_path, kind, device_dir.clone(), compile, names)?;
        }
        Ok(())
    }

    fn add_dependency(&mut self, dep: &ResolvedDependency) -> Result<(), GraphError> {
        let filter = ScanFilter::new(&[], &[], &self.config.workspace.ignore)?;
        let device_dir = device_dir(&self.config.target.lib_dir, &dep.dir)?;
        for file in scan_dir(&dep.dir, &filter)? {
            let is_python = file.rel_path.extension().is_some_and(|e| e == "py");
            let compile = is_python && self.config.target.compile;
            let names = if is_python {
                import_name(&file.rel_path)
            } else {
                None
            };
            let kind = ModuleKind::External {
                dependency: dep.name.clone(),
            };
            self.add_file(file.path, file.rel_path, kind, device_dir.clone(), compile, names)?;
        }
        Ok(())
    }

    fn add_file(
        &mut self,
        source: PathBuf,
        rel_path: PathBuf,
        kind: ModuleKind,
        device_dir: Option<DevicePath>,
        compile: bool,
        import_name: Option<String>,
    ) -> Result<(), GraphError> {
        let bytes = std::fs::read(&source).map_err(|e| GraphError::Io {
            path: source.clone(),
            source: e,
        })?;
        let id = ModuleId::new(match source.strip_prefix(self.root) {
            Ok(rel) => slash_path(rel),
            Err(_) => source.display().to_string(),
        });
        if self.modules.contains_key(&id) {
            return Err(GraphError::DuplicateModule { id });
        }

        if let Some(name) = &import_name {
            match self.names.get(name) {
                Some(existing) => tracing::warn!(
                    import = %name,
                    used = %existing,
                    shadowed = %id,
                    "import name provided twice, first one wins"
                ),
                None => {
                    self.names.insert(name.clone(), id.clone());
                }
            }
        }
        if matches!(kind, ModuleKind::Package | ModuleKind::File) {
            self.texts
                .insert(id.clone(), String::from_utf8_lossy(&bytes).into_owned());
        }

        tracing::debug!(module = %id, ?kind, compile, "found module");
        self.modules.insert(
            id.clone(),
            Module {
                id,
                kind,
                source,
                rel_path,
                device_dir,
                hash: ContentHash::from_bytes(&bytes),
                size: bytes.len() as u64,
                compile,
                dependencies: Vec::new(),
                import_name,
            },
        );
        Ok(())
    }

    fn resolve_imports(mut self) -> Result<Vec<Module>, GraphError> {
        let builtins: BTreeSet<&str> = DEFAULT_BUILTINS
            .iter()
            .copied()
            .chain(self.config.target.builtin_modules.iter().map(String::as_str))
            .collect();

        for (id, text) in &self.texts {
            let module = &self.modules[id];
            let mut deps: Vec<ModuleId> = Vec::new();
            for stmt in parse_imports(text) {
                for dep in resolve_import(module, &stmt, &self.names, &builtins)? {
                    if dep != *id && !deps.contains(&dep) {
                        deps.push(dep);
                    }
                }
            }
            if let Some(module) = self.modules.get_mut(id) {
                module.dependencies = deps;
            }
        }
        Ok(self.modules.into_values().collect())
    }
}

fn device_dir(target: &str, origin: &Path) -> Result<Option<DevicePath>, GraphError> {
    if target.trim_matches('/').is_empty() {
        return Ok(None);
    }
    DevicePath::new(target)
        .map(Some)
        .map_err(|e| GraphError::InvalidPath {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Maps one import statement to the modules it loads.
///
/// Parent packages of the imported module are dependencies too, since the
/// runtime executes them first.
fn resolve_import(
    module: &Module,
    stmt: &ImportStmt,
    names: &BTreeMap<String, ModuleId>,
    builtins: &BTreeSet<&str>,
) -> Result<Vec<ModuleId>, GraphError> {
    let unresolved = |reason: String| GraphError::UnresolvedDependency {
        module: module.id.to_string(),
        dependency: stmt.to_string(),
        reason: format!("line {}: {reason}", stmt.line),
    };

    let base = if stmt.level > 0 {
        let package = module.package_name().unwrap_or("");
        let mut parts: Vec<&str> = package.split('.').filter(|p| !p.is_empty()).collect();
        let up = stmt.level - 1;
        if up > parts.len() {
            return Err(unresolved("relative import beyond top-level package".to_string()));
        }
        parts.truncate(parts.len() - up);
        parts.extend(stmt.module.split('.').filter(|p| !p.is_empty()));
        parts.join(".")
    } else {
        stmt.module.clone()
    };

    let mut found = Vec::new();
    let mut prefix = String::new();
    for part in base.split('.').filter(|p| !p.is_empty()) {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(part);
        if let Some(id) = names.get(&prefix) {
            found.push(id.clone());
        }
    }
    let mut primary = names.contains_key(&base);
    for name in stmt.names.iter().filter(|n| *n != "*") {
        let full = if base.is_empty() {
            name.clone()
        } else {
            format!("{base}.{name}")
        };
        if let Some(id) = names.get(&full) {
            found.push(id.clone());
            primary = true;
        }
    }

    if primary {
        return Ok(found);
    }
    let top = base.split('.').next().unwrap_or("");
    if stmt.level == 0 && builtins.contains(top) {
        return Ok(Vec::new());
    }
    Err(unresolved(format!(
        "no project module, vendored package or device builtin named '{}'",
        if base.is_empty() { stmt.names.join(", ") } else { base }
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flint_config::load_config_from_str;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn config(extra: &str) -> ProjectConfig {
        load_config_from_str(&format!(
            "[project]\nname = \"p\"\nversion = \"0.1.0\"\n\n[workspace]\ncache = \".cache\"\n{extra}"
        ))
        .unwrap()
    }

    fn id(s: &str) -> ModuleId {
        ModuleId::new(s)
    }

    fn module(name: &str, deps: &[&str]) -> Module {
        Module {
            id: id(name),
            kind: ModuleKind::File,
            source: PathBuf::from(name),
            rel_path: PathBuf::from(name),
            device_dir: None,
            hash: ContentHash::from_bytes(name.as_bytes()),
            size: 0,
            compile: true,
            dependencies: deps.iter().map(|d| id(d)).collect(),
            import_name: None,
        }
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let graph = ModuleGraph::from_modules(vec![
            module("main", &["b", "a"]),
            module("b", &["c"]),
            module("a", &["c"]),
            module("c", &[]),
            module("z", &[]),
        ])
        .unwrap();
        let order = graph.topological_order();
        let pos = |n: &str| order.iter().position(|m| m.as_str() == n).unwrap();
        assert_eq!(order.len(), 5);
        for m in graph.modules() {
            for dep in &m.dependencies {
                assert!(pos(dep.as_str()) < pos(m.id.as_str()));
            }
        }
        assert_eq!(
            order.iter().map(ModuleId::as_str).collect::<Vec<_>>(),
            vec!["c", "a", "b", "main", "z"]
        );
    }

    #[test]
    fn topological_order_independent_of_input_order() {
        let mods = vec![
            module("main", &["b", "a"]),
            module("b", &["c"]),
            module("a", &["c"]),
            module("c", &[]),
        ];
        let mut reversed = mods.clone();
        reversed.reverse();
        let first = ModuleGraph::from_modules(mods).unwrap().topological_order();
        let second = ModuleGraph::from_modules(reversed).unwrap().topological_order();
        assert_eq!(first, second);
    }

    #[test]
    fn levels_group_by_depth() {
        let graph = ModuleGraph::from_modules(vec![
            module("main", &["a"]),
            module("a", &["c"]),
            module("b", &["c"]),
            module("c", &[]),
        ])
        .unwrap();
        let levels = graph.levels();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0], vec![id("c")]);
        assert_eq!(levels[1], vec![id("a"), id("b")]);
        assert_eq!(levels[2], vec![id("main")]);
    }

    #[test]
    fn two_cycle_detected() {
        let err = ModuleGraph::from_modules(vec![module("a", &["b"]), module("b", &["a"])])
            .unwrap_err();
        match err {
            GraphError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec![id("a"), id("b")]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn longer_cycle_reports_only_cycle_members() {
        let err = ModuleGraph::from_modules(vec![
            module("entry", &["x"]),
            module("x", &["y"]),
            module("y", &["z"]),
            module("z", &["x"]),
        ])
        .unwrap_err();
        match err {
            GraphError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec![id("x"), id("y"), id("z")]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_rejected() {
        let err = ModuleGraph::from_modules(vec![module("a", &["ghost"])]).unwrap_err();
        assert!(matches!(err, GraphError::UnresolvedDependency { .. }));
    }

    #[test]
    fn dependents_and_dependencies() {
        let graph = ModuleGraph::from_modules(vec![
            module("main", &["a"]),
            module("a", &["c"]),
            module("b", &["c"]),
            module("c", &[]),
        ])
        .unwrap();
        assert_eq!(graph.dependents(&id("c")), vec![&id("a"), &id("b")]);
        assert!(graph.dependents(&id("main")).is_empty());
        assert_eq!(graph.dependencies(&id("main")), &[id("a")]);
    }

    #[test]
    fn build_scans_and_resolves_imports() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/main.py", "import machine\nfrom drivers import led\nimport config\n");
        write(root, "src/config.py", "WIFI = 'x'\n");
        write(root, "src/drivers/__init__.py", "");
        write(root, "src/drivers/led.py", "from . import pins\nfrom .pins import LED\n");
        write(root, "src/drivers/pins.py", "LED = 2\n");
        write(root, "src/www/index.html", "<html></html>");

        let graph = ModuleGraph::build(root, &config(""), &Lockfile::default()).unwrap();
        assert_eq!(graph.len(), 6);

        let main = graph.get(&id("src/main.py")).unwrap();
        assert_eq!(
            main.dependencies,
            vec![id("src/drivers/__init__.py"), id("src/drivers/led.py"), id("src/config.py")]
        );
        assert!(!main.compile, "main.py is kept as source");

        let led = graph.get(&id("src/drivers/led.py")).unwrap();
        assert!(led.compile);
        assert_eq!(led.kind, ModuleKind::File);
        assert_eq!(
            led.dependencies,
            vec![id("src/drivers/__init__.py"), id("src/drivers/pins.py")]
        );

        let html = graph.get(&id("src/www/index.html")).unwrap();
        assert_eq!(html.kind, ModuleKind::Resource);
        assert!(!html.compile);

        let init = graph.get(&id("src/drivers/__init__.py")).unwrap();
        assert_eq!(init.kind, ModuleKind::Package);
    }

    #[test]
    fn unknown_import_is_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.py", "import missing_module\n");
        let err = ModuleGraph::build(dir.path(), &config(""), &Lockfile::default()).unwrap_err();
        match err {
            GraphError::UnresolvedDependency { module, dependency, .. } => {
                assert_eq!(module, "src/main.py");
                assert_eq!(dependency, "import missing_module");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn configured_builtins_accepted() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/main.py", "import esp32\nimport neopixel\n");
        let cfg = config("\n[target]\nbuiltin_modules = [\"esp32\", \"neopixel\"]\n");
        let graph = ModuleGraph::build(dir.path(), &cfg, &Lockfile::default()).unwrap();
        assert!(graph.get(&id("src/main.py")).unwrap().dependencies.is_empty());
    }

    #[test]
    fn import_cycle_in_project_detected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "src/a.py", "import b\n");
        write(dir.path(), "src/b.py", "import a\n");
        let err = ModuleGraph::build(dir.path(), &config(""), &Lockfile::default()).unwrap_err();
        match err {
            GraphError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec![id("src/a.py"), id("src/b.py")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn vendored_dependency_becomes_external_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/app.py", "import logging\n");
        write(root, "packages/logging/logging.py", "import nonexistent_but_unscanned\n");
        write(root, "flint.lock", "");
        let cfg = config("\n[dependencies]\nlogging = \"^0.5\"\n");
        let lock = Lockfile::parse("[[package]]\nname = \"logging\"\nversion = \"0.5.1\"\n").unwrap();
        let graph = ModuleGraph::build(root, &cfg, &lock).unwrap();

        let ext = graph.get(&id("packages/logging/logging.py")).unwrap();
        assert!(ext.is_external());
        assert!(ext.dependencies.is_empty());
        assert_eq!(ext.device_dir, Some(DevicePath::new("lib").unwrap()));
        assert_eq!(
            graph.get(&id("src/app.py")).unwrap().dependencies,
            vec![id("packages/logging/logging.py")]
        );
        assert_eq!(graph.external_dependencies().len(), 1);
    }

    #[test]
    fn resource_sets_copied_verbatim_under_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "src/main.py", "");
        write(root, "www/app.py", "this is served, not imported");
        let cfg = config("\n[[sources]]\nname = \"app\"\nroot = \"src\"\n\n[[resources]]\nname = \"web\"\nroot = \"www\"\ntarget = \"www\"\n");
        let graph = ModuleGraph::build(root, &cfg, &Lockfile::default()).unwrap();
        let served = graph.get(&id("www/app.py")).unwrap();
        assert_eq!(served.kind, ModuleKind::Resource);
        assert!(!served.compile);
        assert_eq!(served.device_dir, Some(DevicePath::new("www").unwrap()));
    }

    #[test]
    fn build_output_not_scanned_when_root_is_project() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "main.py", "");
        write(root, "build/device/main.py", "");
        let cfg = config("\n[[sources]]\nname = \"app\"\nroot = \".\"\ninclude = [\"**/*.py\"]\n");
        let graph = ModuleGraph::build(root, &cfg, &Lockfile::default()).unwrap();
        assert_eq!(graph.len(), 1);
    }
}
