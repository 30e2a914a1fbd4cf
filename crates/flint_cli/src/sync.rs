//! `flint sync`: build, then bring the device up to date.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use flint_build::{HookContext, HookRegistry, HookStage};
use flint_config::{ConfigError, TransportKind};
use flint_sync::{
    plan, DeviceState, DeviceSyncExecutor, DeviceTransport, DirectoryTransport, MpremoteTransport,
    RetryPolicy, SyncError,
};

use crate::pipeline::{build_project, Project};
use crate::{GlobalArgs, SyncArgs, EXIT_COMPILE, EXIT_INTERRUPTED};

/// Runs the `flint sync` command.
///
/// Returns exit code 0 on success and 1 when the build failed. Sync failures
/// are returned as errors so that they map to their own exit status.
pub fn run(args: &SyncArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let cancel = Arc::new(AtomicBool::new(false));
    if !args.dry_run {
        install_interrupt_handler(Arc::clone(&cancel));
    }
    sync_project(&project, args, global, cancel)
}

/// Builds the project and applies the resulting plan to the device.
pub fn sync_project(
    project: &Project,
    args: &SyncArgs,
    global: &GlobalArgs,
    cancel: Arc<AtomicBool>,
) -> Result<i32, Box<dyn std::error::Error>> {
    let Some(built) = build_project(project, global)? else {
        return Ok(EXIT_COMPILE);
    };
    let Project { root, config, .. } = project;
    let device = &config.device;
    let timeout = device.timeout();

    let mut transport = open_transport(project, args)?;
    let state_file = config.workspace.state_file(root);
    let previous = DeviceState::load(&state_file)?;

    let mut state = if args.rescan {
        if !global.quiet {
            eprintln!("    Scanning {} device", transport.name());
        }
        let listing = transport.list_files(timeout).map_err(SyncError::Listing)?;
        let state = DeviceState::from_listing(&listing, previous.as_ref());
        tracing::info!(files = state.len(), "device state rebuilt from listing");
        if !args.dry_run {
            state.save(&state_file)?;
        }
        Some(state)
    } else {
        previous
    };

    let sync_plan = plan(&built.manifest, state.as_ref());
    let summary = sync_plan.summary();

    if args.dry_run {
        for op in &sync_plan.ops {
            println!("{op}");
        }
        if !global.quiet {
            eprintln!("     Planned {summary}");
        }
        return Ok(0);
    }

    if sync_plan.is_empty() {
        if !global.quiet {
            eprintln!("  Up to date {}", config.project.name);
        }
        return Ok(0);
    }

    if !global.quiet {
        eprintln!("     Syncing {summary}");
    }

    let mut state = state.unwrap_or_default();
    let result = DeviceSyncExecutor::new(transport.as_mut(), &built.cache, &state_file)
        .with_policy(RetryPolicy::from_config(device))
        .with_timeout(timeout)
        .with_cancel_flag(cancel)
        .execute(&sync_plan, &mut state)?;

    let hooks = HookRegistry::from_config(config)?;
    hooks.run(HookStage::AfterSync, &mut HookContext::new(root, config))?;

    if !global.quiet {
        eprintln!(
            "    Finished {} created, {} updated, {} deleted, {} bytes written",
            result.created, result.updated, result.deleted, result.bytes_written
        );
        if result.retries > 0 {
            eprintln!("     Retried {} time(s)", result.retries);
        }
        if result.untracked_dirs > 0 {
            eprintln!(
                "     Skipped {} non-empty director{} left on the device",
                result.untracked_dirs,
                if result.untracked_dirs == 1 { "y" } else { "ies" }
            );
        }
    }
    Ok(0)
}

fn open_transport(
    project: &Project,
    args: &SyncArgs,
) -> Result<Box<dyn DeviceTransport>, Box<dyn std::error::Error>> {
    let device = &project.config.device;
    match device.transport {
        TransportKind::Mpremote => {
            let port = args.port.clone().or_else(|| device.port.clone());
            Ok(Box::new(MpremoteTransport::new(port)))
        }
        TransportKind::Directory => {
            let mount = device
                .mount
                .as_deref()
                .ok_or_else(|| ConfigError::MissingField("device.mount".to_string()))?;
            Ok(Box::new(DirectoryTransport::new(&project.root.join(mount))?))
        }
    }
}

/// First Ctrl-C asks the executor to stop after the current operation; a
/// second one exits at once.
fn install_interrupt_handler(cancel: Arc<AtomicBool>) {
    let spawned = std::thread::Builder::new()
        .name("flint-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot install Ctrl-C handler");
                    return;
                }
            };
            runtime.block_on(async move {
                loop {
                    if tokio::signal::ctrl_c().await.is_err() {
                        return;
                    }
                    if cancel.swap(true, Ordering::SeqCst) {
                        std::process::exit(EXIT_INTERRUPTED);
                    }
                    eprintln!("interrupt: finishing the current operation (Ctrl-C again to abort)");
                }
            });
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "cannot spawn signal thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn setup() -> (tempfile::TempDir, Project, GlobalArgs) {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "flint.toml",
            "[project]\nname = \"board\"\nversion = \"0.1.0\"\n\n\
             [workspace]\ncache = \".cache\"\n\n[target]\ncompile = false\n\n\
             [device]\ntransport = \"directory\"\nmount = \"mnt\"\n",
        );
        write(dir.path(), "src/main.py", "import lib.led\n");
        write(dir.path(), "src/lib/__init__.py", "");
        write(dir.path(), "src/lib/led.py", "ON = 1\n");
        std::fs::create_dir_all(dir.path().join("mnt")).unwrap();

        let global = GlobalArgs {
            quiet: true,
            verbose: false,
            config: Some(dir.path().join("flint.toml").display().to_string()),
            jobs: Some(1),
        };
        let project = Project::load(&global).unwrap();
        (dir, project, global)
    }

    fn args(dry_run: bool, rescan: bool) -> SyncArgs {
        SyncArgs {
            dry_run,
            rescan,
            port: None,
        }
    }

    fn no_cancel() -> Arc<AtomicBool> {
        Arc::new(AtomicBool::new(false))
    }

    #[test]
    fn syncs_to_mounted_directory() {
        let (dir, project, global) = setup();
        let mnt = dir.path().join("mnt");

        let code = sync_project(&project, &args(false, false), &global, no_cancel()).unwrap();
        assert_eq!(code, 0);
        assert_eq!(std::fs::read_to_string(mnt.join("lib/led.py")).unwrap(), "ON = 1\n");
        assert!(mnt.join("main.py").is_file());

        let state = DeviceState::load(&dir.path().join("build/device-state.json"))
            .unwrap()
            .unwrap();
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn dry_run_leaves_device_untouched() {
        let (dir, project, global) = setup();
        let code = sync_project(&project, &args(true, false), &global, no_cancel()).unwrap();
        assert_eq!(code, 0);
        assert_eq!(std::fs::read_dir(dir.path().join("mnt")).unwrap().count(), 0);
        assert!(!dir.path().join("build/device-state.json").exists());
    }

    #[test]
    fn rescan_removes_stray_files() {
        let (dir, project, global) = setup();
        sync_project(&project, &args(false, false), &global, no_cancel()).unwrap();
        write(dir.path(), "mnt/stray.txt", "left over");

        sync_project(&project, &args(false, true), &global, no_cancel()).unwrap();
        assert!(!dir.path().join("mnt/stray.txt").exists());
        assert!(dir.path().join("mnt/main.py").is_file());
    }

    #[test]
    fn cancelled_sync_is_interrupted() {
        let (_dir, project, global) = setup();
        let err = sync_project(
            &project,
            &args(false, false),
            &global,
            Arc::new(AtomicBool::new(true)),
        )
        .unwrap_err();
        assert_eq!(crate::exit_code(err.as_ref()), EXIT_INTERRUPTED);
    }

    #[test]
    fn directory_transport_requires_mount() {
        let (dir, _, global) = setup();
        write(
            dir.path(),
            "flint.toml",
            "[project]\nname = \"board\"\nversion = \"0.1.0\"\n\n\
             [workspace]\ncache = \".cache\"\n\n[target]\ncompile = false\n\n\
             [device]\ntransport = \"directory\"\n",
        );
        let project = Project::load(&global).unwrap();
        let err = sync_project(&project, &args(false, false), &global, no_cancel()).unwrap_err();
        assert_eq!(crate::exit_code(err.as_ref()), crate::EXIT_CONFIG);
    }
}
