//! `cadence validate`: check workflow files.

use anyhow::{bail, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

use cadence::validation;

pub fn cmd_validate(file: Option<&Path>, strict: bool) -> Result<()> {
    let files: Vec<PathBuf> = match file {
        Some(path) => {
            if !path.exists() {
                bail!("Workflow file not found: {}", path.display());
            }
            vec![path.to_path_buf()]
        }
        None => {
            let dir = super::ensure_initialized()?;
            let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    matches!(
                        p.extension().and_then(|s| s.to_str()),
                        Some("yml") | Some("yaml")
                    )
                })
                .collect();
            files.sort();
            files
        }
    };

    if files.is_empty() {
        println!("No workflow files found");
        return Ok(());
    }

    let mut failed = 0usize;
    let mut warnings = 0usize;
    for path in &files {
        let result = validation::validate_file(path);
        result.display(strict);
        warnings += result.warning_count();
        if !result.is_valid(strict) {
            failed += 1;
        }
    }

    println!();
    if failed > 0 {
        bail!(
            "{} of {} workflow file(s) failed validation",
            failed,
            files.len()
        );
    }
    let warning_note = if warnings > 0 {
        format!(" ({} warning(s))", warnings)
    } else {
        String::new()
    };
    println!(
        "{} {} workflow file(s) valid{}",
        "✓".green(),
        files.len(),
        warning_note
    );
    Ok(())
}
