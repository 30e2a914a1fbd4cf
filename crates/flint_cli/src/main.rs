//! Flint CLI: incremental builds and device sync for MicroPython projects.
//!
//! `flint build` compiles what changed and assembles the device tree,
//! `flint sync` brings a connected board up to date and `flint run` runs a
//! module on it afterwards. `flint install` vendors a dependency,
//! `flint clean` removes build output and `flint init` scaffolds a project.

#![warn(missing_docs)]

mod build;
mod clean;
mod init;
mod install;
mod logging;
mod pipeline;
mod run;
mod sync;

use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use flint_build::{BuildError, ManifestError};
use flint_config::ConfigError;
use flint_graph::GraphError;
use flint_sync::{SyncError, TransportError};

/// Flint: build and sync MicroPython projects.
#[derive(Parser, Debug)]
#[command(name = "flint", version, about = "Incremental build and sync for MicroPython devices")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `flint.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Maximum concurrent compiler invocations.
    #[arg(short, long, global = true)]
    pub jobs: Option<usize>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new Flint project.
    Init {
        /// Project name (creates a subdirectory). If omitted, initializes in
        /// the current directory.
        name: Option<String>,
    },
    /// Compile changed modules and assemble the device tree.
    Build,
    /// Build, then bring the device up to date.
    Sync(SyncArgs),
    /// Sync, then run a module on the device.
    Run(RunArgs),
    /// Vendor a dependency into the workspace and pin it in flint.lock.
    Install(InstallArgs),
    /// Remove build output and cached artifacts.
    Clean(CleanArgs),
}

/// Arguments for the `flint sync` subcommand.
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Print the plan without touching the device.
    #[arg(long)]
    pub dry_run: bool,

    /// Rebuild the device state from the device's own listing first.
    #[arg(long)]
    pub rescan: bool,

    /// Serial port, overriding `device.port`.
    #[arg(short, long)]
    pub port: Option<String>,
}

/// Arguments for the `flint run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Module to import on the device.
    #[arg(default_value = "main")]
    pub module: String,

    /// Run what is already on the device.
    #[arg(long)]
    pub no_sync: bool,

    /// Serial port, overriding `device.port`.
    #[arg(short, long)]
    pub port: Option<String>,

    /// Seconds to wait for the module to finish.
    #[arg(long, default_value_t = 60)]
    pub timeout: u64,
}

/// Arguments for the `flint install` subcommand.
#[derive(Parser, Debug)]
pub struct InstallArgs {
    /// Package to install, as `<name>@<version>`.
    pub package: String,

    /// Copy the package from a local directory instead of fetching it.
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Package index `mip` fetches from.
    #[arg(long, default_value = install::DEFAULT_INDEX)]
    pub index: String,

    /// Serial port of the device `mip` runs on, overriding `device.port`.
    #[arg(short, long)]
    pub port: Option<String>,

    /// Install again even if this version is already vendored.
    #[arg(long)]
    pub reinstall: bool,
}

/// Arguments for the `flint clean` subcommand.
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Also forget what was synced to the device.
    #[arg(long)]
    pub state: bool,

    /// Leave the artifact cache in place.
    #[arg(long)]
    pub keep_cache: bool,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
    /// Optional override of `build.jobs`.
    pub jobs: Option<usize>,
}

/// Exit status for compilation failures.
pub const EXIT_COMPILE: i32 = 1;
/// Exit status for a sync that could not complete.
pub const EXIT_SYNC: i32 = 2;
/// Exit status for configuration, graph and manifest errors.
pub const EXIT_CONFIG: i32 = 3;
/// Exit status for internal errors (I/O, cache corruption).
pub const EXIT_INTERNAL: i32 = 4;
/// Exit status after Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
        jobs: cli.jobs,
    };
    logging::init(&global);

    let result = match cli.command {
        Command::Init { name } => init::run(name, &global),
        Command::Build => build::run(&global),
        Command::Sync(ref args) => sync::run(args, &global),
        Command::Run(ref args) => run::run(args, &global),
        Command::Install(ref args) => install::run(args, &global),
        Command::Clean(ref args) => clean::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(exit_code(e.as_ref()));
        }
    }
}

/// Maps an error to the exit status of its category.
pub fn exit_code(err: &(dyn Error + 'static)) -> i32 {
    if let Some(e) = err.downcast_ref::<SyncError>() {
        return match e {
            SyncError::Interrupted { .. } => EXIT_INTERRUPTED,
            SyncError::Manifest(_) => EXIT_CONFIG,
            SyncError::State { .. } => EXIT_INTERNAL,
            SyncError::Failed { .. } | SyncError::Listing(_) => EXIT_SYNC,
        };
    }
    if let Some(e) = err.downcast_ref::<BuildError>() {
        return match e {
            BuildError::Cache(_) | BuildError::Io { .. } | BuildError::ThreadPool { .. } => {
                EXIT_INTERNAL
            }
            BuildError::Compiler(_)
            | BuildError::Manifest(_)
            | BuildError::UnknownHook { .. }
            | BuildError::Hook { .. } => EXIT_CONFIG,
        };
    }
    if err.is::<TransportError>() {
        EXIT_SYNC
    } else if err.is::<ConfigError>() || err.is::<GraphError>() || err.is::<ManifestError>() {
        EXIT_CONFIG
    } else {
        // cache corruption, I/O
        EXIT_INTERNAL
    }
}
