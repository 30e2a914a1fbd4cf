//! The cross-compiler boundary.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use flint_config::CompilerConfig;

use crate::error::CompilerError;

/// Placeholder in `compiler.args` replaced by the target platform tag.
pub const PLATFORM_PLACEHOLDER: &str = "{platform}";

static OUTPUT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Result of compiling one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The compiler produced output.
    Success(Vec<u8>),
    /// The compiler rejected the module.
    Failed {
        /// Exit status, if the process exited normally.
        status: Option<i32>,
        /// Compiler diagnostics (stderr, then stdout).
        diagnostics: String,
    },
}

/// A source-to-bytecode compiler.
///
/// Implementations must be deterministic: the same source bytes, source name,
/// version, arguments and platform always produce the same bytes. The
/// scheduler calls `compile` from several threads at once.
pub trait Compiler: Sync {
    /// Version string folded into cache keys.
    fn version(&self) -> &str;

    /// Extra arguments that change the output, folded into cache keys.
    fn args(&self) -> &[String] {
        &[]
    }

    /// Compiles one source file for `platform`.
    ///
    /// `source_name` is the name recorded in the output in place of the host
    /// path, so that output does not depend on where the project lives.
    fn compile(
        &self,
        source: &Path,
        source_name: &str,
        platform: &str,
    ) -> Result<CompileOutcome, CompilerError>;
}

/// Runs an external compiler such as `mpy-cross` as a subprocess:
/// `<program> <args…> -s <source name> -o <output> <source>`.
#[derive(Debug)]
pub struct ExternalCompiler {
    program: String,
    args: Vec<String>,
    version: String,
    scratch_dir: PathBuf,
}

impl ExternalCompiler {
    /// Creates the adapter. Uses `compiler.version` when set, otherwise asks
    /// the compiler with `--version`. Output files are written to `scratch_dir`.
    pub fn from_config(config: &CompilerConfig, scratch_dir: &Path) -> Result<Self, CompilerError> {
        let version = match &config.version {
            Some(v) => v.clone(),
            None => query_version(&config.program)?,
        };
        std::fs::create_dir_all(scratch_dir).map_err(|e| CompilerError::Io {
            path: scratch_dir.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(program = %config.program, %version, "using compiler");
        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            version,
            scratch_dir: scratch_dir.to_path_buf(),
        })
    }
}

impl Compiler for ExternalCompiler {
    fn version(&self) -> &str {
        &self.version
    }

    fn args(&self) -> &[String] {
        &self.args
    }

    fn compile(
        &self,
        source: &Path,
        source_name: &str,
        platform: &str,
    ) -> Result<CompileOutcome, CompilerError> {
        let output_path = self.scratch_dir.join(format!(
            "{}-{}.out",
            std::process::id(),
            OUTPUT_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let output = Command::new(&self.program)
            .args(self.args.iter().map(|a| a.replace(PLATFORM_PLACEHOLDER, platform)))
            .arg("-s")
            .arg(source_name)
            .arg("-o")
            .arg(&output_path)
            .arg(source)
            .output()
            .map_err(|e| CompilerError::Launch {
                program: self.program.clone(),
                source: e,
            })?;

        if !output.status.success() {
            let _ = std::fs::remove_file(&output_path);
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                if !diagnostics.is_empty() {
                    diagnostics.push('\n');
                }
                diagnostics.push_str(stdout.trim());
            }
            return Ok(CompileOutcome::Failed {
                status: output.status.code(),
                diagnostics,
            });
        }

        let bytes = std::fs::read(&output_path).map_err(|e| CompilerError::Io {
            path: output_path.clone(),
            source: e,
        })?;
        let _ = std::fs::remove_file(&output_path);
        Ok(CompileOutcome::Success(bytes))
    }
}

/// First non-empty line of `<program> --version`.
fn query_version(program: &str) -> Result<String, CompilerError> {
    let output = Command::new(program)
        .arg("--version")
        .output()
        .map_err(|e| CompilerError::Launch {
            program: program.to_string(),
            source: e,
        })?;
    let text = String::from_utf8_lossy(&output.stdout);
    let line = text.lines().map(str::trim).find(|l| !l.is_empty());
    match (output.status.success(), line) {
        (true, Some(line)) => Ok(line.to_string()),
        (false, _) => Err(CompilerError::Version {
            program: program.to_string(),
            reason: format!("--version exited with {}", output.status),
        }),
        (true, None) => Err(CompilerError::Version {
            program: program.to_string(),
            reason: "--version printed nothing".to_string(),
        }),
    }
}
