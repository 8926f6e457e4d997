//! `cadence status`: list runs or show one run's details.

use anyhow::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};

use cadence::id;
use cadence::paths;
use cadence::runs::{self, RunRecord};
use cadence::ui;

pub fn cmd_status(run_fragment: Option<&str>, limit: usize) -> Result<()> {
    super::ensure_initialized()?;
    let runs_dir = PathBuf::from(paths::RUNS_DIR);

    match run_fragment {
        Some(fragment) => {
            let ids = runs::list_ids(&runs_dir)?;
            let run_id = id::resolve_run_id(fragment, &ids)?;
            show_run(&RunRecord::load(&runs_dir, &run_id)?)
        }
        None => list_runs(&runs_dir, limit),
    }
}

fn list_runs(runs_dir: &Path, limit: usize) -> Result<()> {
    let all = runs::load_all(runs_dir)?;
    if all.is_empty() {
        println!("No runs recorded");
        return Ok(());
    }
    for run in all.iter().take(limit) {
        println!(
            "{} {}  {}  {} on {}  {}",
            ui::state_icon(run.status, run.conclusion),
            run.id.cyan(),
            ui::format::truncate(&run.workflow, 24),
            run.event,
            run.git_ref,
            run.created_at.dimmed()
        );
    }
    Ok(())
}

fn show_run(run: &RunRecord) -> Result<()> {
    println!(
        "{} {} ({})",
        ui::state_icon(run.status, run.conclusion),
        run.workflow.bold(),
        run.id.cyan()
    );
    println!("  event: {} on {}", run.event, run.git_ref);
    if let Some(group) = &run.concurrency_group {
        println!("  group: {}", group);
    }
    if let Some(conclusion) = run.conclusion {
        println!("  conclusion: {}", ui::conclusion_word(conclusion));
    }
    println!();
    for job in &run.jobs {
        println!(
            "  {} {}",
            ui::state_icon(job.status, job.conclusion),
            job.name
        );
        for step in &job.steps {
            let exit = step
                .exit_code
                .map(|c| format!(" (exit {})", c))
                .unwrap_or_default();
            println!(
                "    {} {}{}",
                ui::state_icon(step.status, step.conclusion),
                step.name,
                exit.dimmed()
            );
        }
    }
    Ok(())
}
