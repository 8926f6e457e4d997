//! `cadence run`: execute the workflows an event triggers.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cadence::config::Config;
use cadence::id;
use cadence::paths;
use cadence::runner::CancelToken;
use cadence::runs::{Conclusion, RunRecord};
use cadence::scheduler::{self, ExecuteOptions};
use cadence::trigger::{self, Event, EventKind};
use cadence::ui;
use cadence::validation;
use cadence::workflow::Workflow;

pub fn cmd_run(
    workflow_file: Option<&Path>,
    event_name: &str,
    git_ref: &str,
    changed: &[String],
    job: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let workflows_dir = super::ensure_initialized()?;
    let config = Config::load()?;
    let kind = EventKind::parse(event_name)?;
    let event = Event::new(kind, git_ref).with_changed_paths(changed.to_vec());

    let candidates: Vec<Workflow> = match workflow_file {
        Some(path) => vec![Workflow::load(&resolve_workflow_path(
            path,
            &workflows_dir,
        )?)?],
        None => Workflow::load_all(&workflows_dir)?,
    };

    let mut triggered = Vec::new();
    for wf in candidates {
        if trigger::matches(&wf, &event) {
            triggered.push(wf);
        } else if workflow_file.is_some() && !ui::is_quiet() {
            println!(
                "{} '{}' is not triggered by {} on '{}'",
                "⚠".yellow(),
                wf.display_name(),
                kind,
                git_ref
            );
        }
    }
    if triggered.is_empty() {
        println!("No workflows triggered by {} on '{}'", kind, git_ref);
        return Ok(());
    }

    // Refuse to run files that fail validation.
    for wf in &triggered {
        if let Some(path) = &wf.path {
            let result = validation::validate_file(path);
            if !result.is_valid(false) {
                result.display(false);
                bail!("Workflow '{}' failed validation", wf.display_name());
            }
        }
    }

    if dry_run {
        for wf in &triggered {
            print_plan(wf, job)?;
        }
        return Ok(());
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupted.clone();
        // The handler may already be installed when tests drive this in-process.
        let _ = ctrlc::set_handler(move || {
            eprintln!(
                "\n{} Interrupt received, finishing the current step before winding down",
                "⊘".yellow()
            );
            flag.store(true, Ordering::SeqCst);
        });
    }

    let root = std::env::current_dir().context("Failed to resolve working directory")?;
    let runs_dir = root.join(paths::RUNS_DIR);
    let mut worst = Conclusion::Skipped;
    for wf in &triggered {
        let run_id = id::generate_run_id(&runs_dir)?;
        if !ui::is_quiet() {
            println!(
                "{} {} ({})",
                ui::colors::heading("Running"),
                wf.display_name().cyan(),
                run_id.dimmed()
            );
        }

        let cancel = CancelToken::with_flag(interrupted.clone(), &runs_dir, &run_id);
        let opts = ExecuteOptions {
            run_id: run_id.clone(),
            event: event.clone(),
            job_filter: job.map(String::from),
        };
        let run = scheduler::execute(wf, &config, &root, &opts, &cancel)?;
        let conclusion = run.conclusion.unwrap_or(Conclusion::Failure);

        if !ui::is_quiet() {
            let elapsed = elapsed(&run)
                .map(|e| format!(" in {}", e))
                .unwrap_or_default();
            println!(
                "{} {} {}{}",
                ui::state_icon(run.status, run.conclusion),
                wf.display_name(),
                ui::conclusion_word(conclusion),
                elapsed.dimmed()
            );
        }
        worst = worst.worst(conclusion);
    }

    if worst == Conclusion::Failure {
        bail!("One or more runs failed");
    }
    Ok(())
}

/// Accept a bare file name, a name relative to the workflows directory,
/// or a full path.
fn resolve_workflow_path(path: &Path, workflows_dir: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let in_dir = workflows_dir.join(path);
    if in_dir.exists() {
        return Ok(in_dir);
    }
    if path.extension().is_none() {
        let with_ext = workflows_dir.join(format!("{}.yml", path.display()));
        if with_ext.exists() {
            return Ok(with_ext);
        }
    }
    bail!("Workflow file not found: {}", path.display());
}

fn print_plan(wf: &Workflow, job: Option<&str>) -> Result<()> {
    let planned = scheduler::plan(wf, job)?;
    println!(
        "{} {}",
        ui::colors::heading("Plan for"),
        wf.display_name().cyan()
    );
    for p in &planned {
        let needs = if p.needs.is_empty() {
            String::new()
        } else {
            format!("  (needs: {})", p.needs.join(", "))
        };
        println!("  {}{}", p.job_id, needs.dimmed());
        for inst in &p.instances {
            println!("    - {}", inst.name);
        }
    }
    Ok(())
}

fn elapsed(run: &RunRecord) -> Option<String> {
    let fmt = "%Y-%m-%dT%H:%M:%SZ";
    let start = chrono::NaiveDateTime::parse_from_str(&run.created_at, fmt).ok()?;
    let end = chrono::NaiveDateTime::parse_from_str(run.completed_at.as_deref()?, fmt).ok()?;
    Some(ui::format::elapsed_seconds((end - start).num_seconds()))
}
