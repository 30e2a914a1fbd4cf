//! `flint build`: compile what changed and assemble the device tree.

use crate::pipeline::{build_project, Project};
use crate::{GlobalArgs, EXIT_COMPILE};

/// Runs the `flint build` command.
///
/// Returns exit code 0 on success, 1 when a module failed to compile.
pub fn run(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = Project::load(global)?;
    match build_project(&project, global)? {
        Some(_) => Ok(0),
        None => Ok(EXIT_COMPILE),
    }
}
