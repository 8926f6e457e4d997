//! Step execution for a single job instance.
//!
//! Steps run sequentially through the shell, with environment layered
//! workflow < job < step over the process environment. Output streams to a
//! per-job log file. Cancellation is cooperative and observed between
//! steps: an in-flight step finishes (or times out) before the instance
//! winds down.

use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache;
use crate::expr::{self, EvalContext};
use crate::matrix::Combination;
use crate::runs::{self, Conclusion, JobRecord, Status, StepRecord};
use crate::utc_now_iso;
use crate::workflow::{Job, Step};

/// Shared cancellation token: an in-process flag plus the on-disk cancel
/// flag written by `cadence cancel` or a cancel-in-progress takeover.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    runs_dir: PathBuf,
    run_id: String,
}

impl CancelToken {
    pub fn new(runs_dir: &Path, run_id: &str) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            runs_dir: runs_dir.to_path_buf(),
            run_id: run_id.to_string(),
        }
    }

    /// Build a token around an existing flag, so one interrupt handler can
    /// cover successive runs in the same process.
    pub fn with_flag(flag: Arc<AtomicBool>, runs_dir: &Path, run_id: &str) -> Self {
        Self {
            flag,
            runs_dir: runs_dir.to_path_buf(),
            run_id: run_id.to_string(),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || runs::is_cancel_requested(&self.runs_dir, &self.run_id)
    }
}

/// Immutable per-run context shared by every job instance.
#[derive(Debug, Clone)]
pub struct RunEnv {
    pub run_id: String,
    /// Repository root steps execute in.
    pub workspace: PathBuf,
    pub logs_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub default_shell: String,
    pub event_name: String,
    pub event_ref: String,
    /// Engine config env, applied under the workflow's own `env`.
    pub base_env: BTreeMap<String, String>,
    pub workflow_env: BTreeMap<String, String>,
}

/// One job instance to execute: a job plus one matrix combination.
#[derive(Debug, Clone)]
pub struct InstanceTask {
    pub job_id: String,
    pub job: Job,
    pub combo: Combination,
    /// Conclusions of the jobs this one needs, by job id.
    pub needs_results: BTreeMap<String, String>,
}

/// A cache save deferred to the end of the instance.
struct PendingCacheSave {
    key: String,
    paths: Vec<String>,
}

/// Execute one job instance, updating `record` step by step.
///
/// Returns the instance conclusion. `sibling_failed` is the fail-fast
/// flag shared between matrix legs of the same job.
pub fn run_instance(
    env: &RunEnv,
    task: &InstanceTask,
    record: &mut JobRecord,
    cancel: &CancelToken,
    sibling_failed: Option<&Arc<AtomicBool>>,
) -> Result<Conclusion> {
    let mut ctx = EvalContext {
        matrix: task.combo.clone(),
        env: BTreeMap::new(),
        event_name: env.event_name.clone(),
        event_ref: env.event_ref.clone(),
        needs: task.needs_results.clone(),
        failed: task
            .needs_results
            .values()
            .any(|r| r == "failure" || r == "cancelled"),
        cancelled: false,
        needs_unmet: task.needs_results.values().any(|r| r != "success"),
        workspace: env.workspace.clone(),
    };

    // Layer env: config < workflow < job, with job values interpolated.
    let mut merged_env = env.base_env.clone();
    merged_env.extend(env.workflow_env.clone());
    for (k, v) in &task.job.env {
        merged_env.insert(k.clone(), expr::interpolate(v, &ctx)?);
    }
    ctx.env = merged_env;

    record.status = Status::InProgress;
    record.started_at = Some(utc_now_iso());

    // Job-level condition, evaluated with the matrix context.
    let job_condition = task.job.if_expr.as_deref().unwrap_or("success()");
    if !expr::evaluate_condition(job_condition, &ctx)? {
        finish_all_steps(record, Conclusion::Skipped);
        record.status = Status::Completed;
        record.conclusion = Some(Conclusion::Skipped);
        record.completed_at = Some(utc_now_iso());
        return Ok(Conclusion::Skipped);
    }

    // Past the gate. Step-level status functions observe this instance's
    // own steps, not the dependency conclusions that gated the job.
    ctx.failed = false;
    ctx.needs_unmet = false;

    record.name = expr::interpolate(&record.name, &ctx)?;
    let mut log = open_log(env, &record.name)?;
    record.log_file = Some(log.relative.clone());

    let mut failed = false;
    let mut cancelled = false;
    let mut pending_saves: Vec<PendingCacheSave> = Vec::new();

    for (index, step) in task.job.steps.iter().enumerate() {
        let step_record = &mut record.steps[index];

        if cancelled
            || cancel.is_cancelled()
            || sibling_failed.map(|f| f.load(Ordering::SeqCst)).unwrap_or(false)
        {
            cancelled = true;
            step_record.status = Status::Completed;
            step_record.conclusion = Some(Conclusion::Cancelled);
            continue;
        }

        ctx.failed = failed;
        let condition = step.if_expr.as_deref().unwrap_or("success()");
        if !expr::evaluate_condition(condition, &ctx)? {
            step_record.status = Status::Completed;
            step_record.conclusion = Some(Conclusion::Skipped);
            continue;
        }

        step_record.status = Status::InProgress;
        step_record.started_at = Some(utc_now_iso());
        step_record.name = expr::interpolate(&step.display_name(index), &ctx)?;
        writeln!(log.file, "### {}", step_record.name)?;

        let conclusion = if step.is_cache_action() {
            run_cache_step(env, step, &ctx, &mut log.file, &mut pending_saves)?
        } else if step.uses.is_some() {
            let uses = step.uses.as_deref().unwrap_or_default();
            writeln!(log.file, "Skipping external action {}", uses)?;
            Conclusion::Skipped
        } else if let Some(script) = &step.run {
            run_shell_step(env, task, step, script, &ctx, &mut log.file, step_record)?
        } else {
            writeln!(log.file, "Step has neither 'run' nor 'uses'")?;
            Conclusion::Failure
        };

        step_record.status = Status::Completed;
        step_record.completed_at = Some(utc_now_iso());
        step_record.conclusion = Some(conclusion);

        if conclusion == Conclusion::Failure && !step.continue_on_error {
            failed = true;
        }
    }

    // Cache entries are only worth keeping from a clean instance.
    if !failed && !cancelled {
        for save in pending_saves {
            let saved = cache::save(&env.cache_dir, &env.workspace, &save.key, &save.paths)?;
            if saved {
                writeln!(log.file, "Saved cache entry '{}'", save.key)?;
            }
        }
    }

    let conclusion = if cancelled {
        Conclusion::Cancelled
    } else if failed {
        Conclusion::Failure
    } else {
        Conclusion::Success
    };

    record.status = Status::Completed;
    record.conclusion = Some(conclusion);
    record.completed_at = Some(utc_now_iso());
    Ok(conclusion)
}

/// Build the initial record for an instance, with every step pending.
pub fn instance_record(job_id: &str, name: &str, combo: &Combination, job: &Job) -> JobRecord {
    JobRecord {
        job_id: job_id.to_string(),
        name: name.to_string(),
        matrix: combo.clone(),
        status: Status::Pending,
        conclusion: None,
        started_at: None,
        completed_at: None,
        log_file: None,
        steps: job
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepRecord::pending(&s.display_name(i)))
            .collect(),
    }
}

fn finish_all_steps(record: &mut JobRecord, conclusion: Conclusion) {
    for step in &mut record.steps {
        step.status = Status::Completed;
        step.conclusion = Some(conclusion);
    }
}

struct JobLog {
    file: std::fs::File,
    relative: String,
}

fn open_log(env: &RunEnv, instance_name: &str) -> Result<JobLog> {
    let run_logs = env.logs_dir.join(&env.run_id);
    std::fs::create_dir_all(&run_logs)
        .with_context(|| format!("Failed to create {}", run_logs.display()))?;
    let file_name = format!("{}.log", sanitize_name(instance_name));
    let path = run_logs.join(&file_name);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    Ok(JobLog {
        file,
        relative: format!("{}/{}", env.run_id, file_name),
    })
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Execute a `run` step through the shell.
fn run_shell_step(
    env: &RunEnv,
    task: &InstanceTask,
    step: &Step,
    script: &str,
    ctx: &EvalContext,
    log: &mut std::fs::File,
    step_record: &mut StepRecord,
) -> Result<Conclusion> {
    let script = expr::interpolate(script, ctx)?;

    let shell = step
        .shell
        .as_deref()
        .or(task.job.defaults.run.shell.as_deref())
        .unwrap_or(&env.default_shell);

    let workdir_decl = step
        .working_directory
        .as_deref()
        .or(task.job.defaults.run.working_directory.as_deref());
    let workdir = match workdir_decl {
        Some(dir) => env.workspace.join(expr::interpolate(dir, ctx)?),
        None => env.workspace.clone(),
    };

    let mut command = Command::new(shell);
    // sh and bash scripts fail on the first erroring command.
    if shell == "sh" || shell == "bash" {
        command.arg("-e");
    }
    command.arg("-c").arg(&script);
    command.current_dir(&workdir);
    for (k, v) in &ctx.env {
        command.env(k, v);
    }
    for (k, v) in &step.env {
        command.env(k, expr::interpolate(v, ctx)?);
    }
    command.env("CADENCE_RUN_ID", &env.run_id);
    command.env("CADENCE_JOB", &task.job_id);
    command.env("CADENCE_EVENT", &env.event_name);

    command.stdout(Stdio::from(log.try_clone()?));
    command.stderr(Stdio::from(log.try_clone()?));
    command.stdin(Stdio::null());

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to spawn shell '{}'", shell))?;

    let timeout = step
        .timeout_minutes
        .or(task.job.timeout_minutes)
        .map(|m| Duration::from_secs(m * 60));

    let status = match timeout {
        Some(limit) => {
            let deadline = Instant::now() + limit;
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if Instant::now() >= deadline {
                    child.kill().ok();
                    let _ = child.wait();
                    writeln!(log, "Step timed out after {:?}", limit)?;
                    step_record.exit_code = None;
                    return Ok(Conclusion::Failure);
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
        None => child.wait()?,
    };

    step_record.exit_code = status.code();
    if status.success() {
        Ok(Conclusion::Success)
    } else {
        Ok(Conclusion::Failure)
    }
}

/// Handle the built-in cache action: restore now, save at instance end.
fn run_cache_step(
    env: &RunEnv,
    step: &Step,
    ctx: &EvalContext,
    log: &mut std::fs::File,
    pending_saves: &mut Vec<PendingCacheSave>,
) -> Result<Conclusion> {
    let key = step
        .with
        .get("key")
        .ok_or_else(|| anyhow!("Cache step is missing 'with.key'"))?;
    let key = expr::interpolate(key, ctx)?;

    let paths = step
        .with
        .get("path")
        .ok_or_else(|| anyhow!("Cache step is missing 'with.path'"))?
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| expr::interpolate(l, ctx))
        .collect::<Result<Vec<String>>>()?;

    let restore_keys: Vec<String> = step
        .with
        .get("restore-keys")
        .map(|s| {
            s.lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let restore_keys = restore_keys
        .iter()
        .map(|k| expr::interpolate(k, ctx))
        .collect::<Result<Vec<_>>>()?;

    let outcome = cache::restore(&env.cache_dir, &env.workspace, &key, &restore_keys)?;
    match &outcome {
        cache::RestoreOutcome::ExactHit(k) => writeln!(log, "Cache hit: {}", k)?,
        cache::RestoreOutcome::PartialHit(k) => writeln!(log, "Cache restored from: {}", k)?,
        cache::RestoreOutcome::Miss => writeln!(log, "Cache miss for key: {}", key)?,
    }

    // Only a miss needs a save; exact hits are immutable.
    if !matches!(outcome, cache::RestoreOutcome::ExactHit(_)) {
        pending_saves.push(PendingCacheSave { key, paths });
    }
    Ok(Conclusion::Success)
}
