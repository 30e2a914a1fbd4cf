//! `flint clean`: remove build output.

use std::path::Path;

use flint_cache::ArtifactCache;

use crate::pipeline::Project;
use crate::{CleanArgs, GlobalArgs};

/// Runs the `flint clean` command.
///
/// Empties the build directory and the artifact cache. The device state file
/// survives unless `--state` is given, since losing it forces a full upload on
/// the next sync.
pub fn run(args: &CleanArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let (removed, evicted) = clean_project(&project, args)?;

    if !global.quiet {
        eprintln!("     Removed {removed} build entries");
        if !args.keep_cache {
            eprintln!("     Removed {evicted} cached artifacts");
        }
    }
    Ok(0)
}

/// Returns the number of build entries and cached artifacts removed.
fn clean_project(
    project: &Project,
    args: &CleanArgs,
) -> Result<(usize, usize), Box<dyn std::error::Error>> {
    let workspace = &project.config.workspace;
    let build_dir = workspace.build_dir(&project.root);
    let cache_dir = workspace.cache_dir(&project.root);
    let state_file = workspace.state_file(&project.root);

    // The cache may live under the build directory; it is emptied separately.
    let keep: Vec<&Path> = [
        (!args.state).then_some(state_file.as_path()),
        Some(cache_dir.as_path()),
    ]
    .into_iter()
    .flatten()
    .collect();
    let removed = clean_dir(&build_dir, &keep)?;

    let mut evicted = 0;
    if !args.keep_cache && cache_dir.is_dir() {
        evicted = ArtifactCache::open(&cache_dir)?.clear()?;
    }
    tracing::info!(removed, evicted, "clean complete");
    Ok((removed, evicted))
}

/// Removes every entry of `dir` except the paths in `keep`, descending into
/// directories that contain a kept path. Returns the number of entries removed.
fn clean_dir(dir: &Path, keep: &[&Path]) -> std::io::Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for item in std::fs::read_dir(dir)? {
        let path = item?.path();
        if keep.iter().any(|k| *k == path) {
            continue;
        }
        if path.is_dir() {
            if keep.iter().any(|k| k.starts_with(&path)) {
                removed += clean_dir(&path, keep)?;
            } else {
                std::fs::remove_dir_all(&path)?;
                removed += 1;
            }
        } else {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
    }
    tracing::debug!(dir = %dir.display(), removed, "cleaned");
    Ok(removed)
}
