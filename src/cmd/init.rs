//! `cadence init`: scaffold the .cadence/ directory.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::Path;

use cadence::paths;
use cadence::templates;

pub fn cmd_init(name: Option<&str>, branch: &str, force: bool) -> Result<()> {
    let base = Path::new(".cadence");
    if base.exists() && !force {
        if !atty::is(atty::Stream::Stdin) {
            bail!("A .cadence/ directory already exists. Use --force to refresh the starter files.");
        }
        let refresh = dialoguer::Confirm::new()
            .with_prompt("A .cadence/ directory already exists. Refresh the starter files?")
            .default(false)
            .interact()?;
        if !refresh {
            println!("Leaving the existing configuration in place.");
            return Ok(());
        }
    }

    for dir in [
        paths::WORKFLOWS_DIR,
        paths::RUNS_DIR,
        paths::LOGS_DIR,
        paths::CACHE_DIR,
        paths::LOCKS_DIR,
    ] {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir))?;
    }

    let project = match name {
        Some(n) => n.to_string(),
        None => detect_project_name(),
    };

    let config_path = Path::new(paths::CONFIG_FILE);
    if !config_path.exists() || force {
        fs::write(config_path, templates::starter_config("sh", 4)?)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("  {} {}", "created".green(), config_path.display());
    }

    let workflow_path = Path::new(paths::WORKFLOWS_DIR).join("ci.yml");
    if !workflow_path.exists() || force {
        fs::write(&workflow_path, templates::starter_workflow(&project, branch)?)
            .with_context(|| format!("Failed to write {}", workflow_path.display()))?;
        println!("  {} {}", "created".green(), workflow_path.display());
    }

    println!();
    println!(
        "{} Initialized cadence for '{}'",
        "✓".green(),
        project.cyan()
    );
    println!();
    println!("Next steps:");
    println!("  1. Edit {}", workflow_path.display());
    println!("  2. Run `cadence validate`");
    println!("  3. Run `cadence run --event push --ref {}`", branch);
    Ok(())
}

fn detect_project_name() -> String {
    std::env::current_dir()
        .ok()
        .and_then(|d| d.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "project".to_string())
}
