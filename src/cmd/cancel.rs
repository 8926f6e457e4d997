//! `cadence cancel`: request cooperative cancellation of a run.

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cadence::id;
use cadence::paths;
use cadence::runs::{self, RunRecord, Status};
use cadence::ui;

pub fn cmd_cancel(run_fragment: &str, wait: bool) -> Result<()> {
    super::ensure_initialized()?;
    let runs_dir = PathBuf::from(paths::RUNS_DIR);
    let ids = runs::list_ids(&runs_dir)?;
    let run_id = id::resolve_run_id(run_fragment, &ids)?;
    let run = RunRecord::load(&runs_dir, &run_id)?;

    if run.status == Status::Completed {
        let word = run
            .conclusion
            .map(|c| c.to_string())
            .unwrap_or_else(|| "done".to_string());
        println!("Run {} already completed ({})", run_id.cyan(), word);
        return Ok(());
    }

    runs::request_cancel(&runs_dir, &run_id)?;
    println!(
        "{} Requested cancellation of run {}",
        "⊘".yellow(),
        run_id.cyan()
    );

    if wait {
        wait_for_completion(&runs_dir, &run_id)?;
    }
    Ok(())
}

/// Poll the run record until the running process marks it completed.
fn wait_for_completion(runs_dir: &Path, run_id: &str) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.yellow} {msg}")?);
    spinner.set_message(format!("Waiting for run {} to wind down", run_id));
    spinner.enable_steady_tick(Duration::from_millis(120));

    loop {
        let run = RunRecord::load(runs_dir, run_id)?;
        if run.status == Status::Completed {
            spinner.finish_and_clear();
            let word = run
                .conclusion
                .map(ui::conclusion_word)
                .unwrap_or_else(|| "done".normal());
            println!(
                "{} Run {} {}",
                ui::state_icon(run.status, run.conclusion),
                run_id.cyan(),
                word
            );
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(500));
    }
}
