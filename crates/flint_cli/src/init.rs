//! `flint init`: project scaffolding.
//!
//! Creates `flint.toml`, a `src/` directory with `boot.py` and `main.py`
//! templates and a `.gitignore` for build output.

use std::fs;
use std::path::{Path, PathBuf};

use flint_config::CONFIG_FILE;

use crate::GlobalArgs;

/// Runs the `flint init` command.
///
/// If `name` is `Some`, creates a new subdirectory with that name.
/// Otherwise initializes in the current working directory.
pub fn run(name: Option<String>, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project_dir = match &name {
        Some(n) => {
            let dir = PathBuf::from(n);
            if dir.exists() {
                return Err(format!("directory '{n}' already exists").into());
            }
            fs::create_dir_all(&dir)?;
            dir
        }
        None => std::env::current_dir()?,
    };

    let project_name = project_dir
        .canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "app".to_string());

    if !global.quiet {
        eprintln!("  Creating new Flint project `{project_name}`");
    }
    let created = init_project(&project_dir, &project_name)?;
    if !global.quiet {
        for path in created {
            eprintln!("     Created {}", path.display());
        }
    }
    Ok(0)
}

/// Writes the project skeleton into `root` and returns the created files.
fn init_project(root: &Path, name: &str) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let config_path = root.join(CONFIG_FILE);
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()).into());
    }

    fs::create_dir_all(root.join("src"))?;
    let files = [
        (config_path, flint_toml(name)),
        (root.join("src").join("boot.py"), BOOT_PY.to_string()),
        (root.join("src").join("main.py"), MAIN_PY.to_string()),
        (root.join(".gitignore"), "build/\n".to_string()),
    ];
    let mut created = Vec::new();
    for (path, content) in files {
        if path.exists() {
            continue;
        }
        fs::write(&path, content)?;
        created.push(path);
    }
    Ok(created)
}

fn flint_toml(name: &str) -> String {
    format!(
        r#"[project]
name = "{name}"
version = "0.1.0"

[target]
platform = "micropython"

[compiler]
program = "mpy-cross"

[device]
transport = "mpremote"
# port = "/dev/ttyACM0"

[[sources]]
name = "app"
root = "src"

[hooks]
enabled = ["app-info"]
"#
    )
}

const BOOT_PY: &str = "# Runs on every boot, before main.py.\n";

const MAIN_PY: &str = r#"import json


def main():
    with open("app_info.json") as f:
        info = json.load(f)
    print("{} v{}".format(info["name"], info["version"]))


main()
"#;
