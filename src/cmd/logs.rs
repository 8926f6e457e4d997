//! `cadence logs`: print job logs for a run.

use anyhow::Result;
use std::path::PathBuf;

use cadence::id;
use cadence::paths;
use cadence::runs::{self, RunRecord};
use cadence::ui;

pub fn cmd_logs(run_fragment: &str, job_filter: Option<&str>) -> Result<()> {
    super::ensure_initialized()?;
    let runs_dir = PathBuf::from(paths::RUNS_DIR);
    let ids = runs::list_ids(&runs_dir)?;
    let run_id = id::resolve_run_id(run_fragment, &ids)?;
    let run = RunRecord::load(&runs_dir, &run_id)?;

    let logs_dir = PathBuf::from(paths::LOGS_DIR);
    let mut shown = 0usize;
    for job in &run.jobs {
        if let Some(filter) = job_filter {
            if !job.name.contains(filter) && job.job_id != filter {
                continue;
            }
        }
        let Some(rel) = &job.log_file else {
            continue;
        };
        let path = logs_dir.join(rel);
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        println!("{}", ui::colors::heading(&format!("==> {}", job.name)));
        print!("{}", content);
        if !content.ends_with('\n') {
            println!();
        }
        shown += 1;
    }

    if shown == 0 {
        println!("No logs found for run {}", run.id);
    }
    Ok(())
}
