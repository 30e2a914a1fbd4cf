//! `flint run`: sync, then run a module on the device.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use flint_config::{ConfigError, TransportKind};
use flint_sync::MpremoteTransport;

use crate::pipeline::Project;
use crate::sync::sync_project;
use crate::{GlobalArgs, RunArgs, SyncArgs};

/// Runs the `flint run` command.
///
/// The project is synced first unless `--no-sync` is given, so the device
/// runs what is in the working tree. Output of the module is printed once it
/// finishes.
pub fn run(args: &RunArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    let transport = device_runner(&project, args)?;

    if !args.no_sync {
        let sync_args = SyncArgs {
            dry_run: false,
            rescan: false,
            port: args.port.clone(),
        };
        let code = sync_project(&project, &sync_args, global, Arc::new(AtomicBool::new(false)))?;
        if code != 0 {
            return Ok(code);
        }
    }

    if !global.quiet {
        eprintln!("     Running {}", args.module);
    }
    let output = transport.run_module(&args.module, Duration::from_secs(args.timeout))?;
    print!("{output}");
    Ok(0)
}

/// Checks the module name and the device configuration before anything runs.
fn device_runner(project: &Project, args: &RunArgs) -> Result<MpremoteTransport, ConfigError> {
    if !is_module_name(&args.module) {
        return Err(ConfigError::ValidationError(format!(
            "'{}' is not a module name",
            args.module
        )));
    }
    let device = &project.config.device;
    if device.transport != TransportKind::Mpremote {
        return Err(ConfigError::ValidationError(
            "flint run needs device.transport = \"mpremote\"".to_string(),
        ));
    }
    let port = args.port.clone().or_else(|| device.port.clone());
    Ok(MpremoteTransport::new(port))
}

/// A dotted Python module path such as `main` or `app.sensors`.
fn is_module_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
