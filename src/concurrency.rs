//! Concurrency groups and cancel-in-progress.
//!
//! Runs in the same group never execute concurrently. When a new run
//! arrives for a busy group, `cancel-in-progress: true` cancels the live
//! run (cancel flag plus SIGTERM) and proceeds; `false` refuses to start,
//! naming the run that holds the group.

use anyhow::{bail, Result};
use std::path::Path;

use crate::expr::{self, EvalContext};
use crate::lock;
use crate::runs;
use crate::trigger::Event;
use crate::workflow::Workflow;

/// A held concurrency group, released on drop or explicitly.
#[derive(Debug)]
pub struct GroupGuard {
    locks_dir: std::path::PathBuf,
    pub group: String,
}

impl GroupGuard {
    pub fn release(self) {
        // Drop does the work.
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        let _ = lock::remove_lock(&self.locks_dir, &self.group);
    }
}

/// Compute the concurrency group key for a workflow run.
///
/// The declared group is interpolated with the event context; with no
/// declaration the group defaults to `<workflow>-<ref>`, which still
/// serializes runs of the same workflow on the same ref.
pub fn group_key(workflow: &Workflow, event: &Event, ctx: &EvalContext) -> Result<String> {
    match &workflow.concurrency {
        Some(c) => expr::interpolate(&c.group, ctx),
        None => Ok(format!("{}-{}", workflow.display_name(), event.git_ref)),
    }
}

/// Acquire the concurrency group for a new run.
///
/// Stale locks (dead pid) are reaped first. A live holder is either
/// cancelled (cancel-in-progress) or reported as a conflict.
pub fn acquire(
    locks_dir: &Path,
    runs_dir: &Path,
    group: &str,
    run_id: &str,
    cancel_in_progress: bool,
) -> Result<GroupGuard> {
    lock::cleanup_stale_locks(locks_dir)?;

    if let Some(holder) = lock::read_lock(locks_dir, group)? {
        if lock::is_process_running(holder.pid) && holder.pid != std::process::id() {
            if !cancel_in_progress {
                bail!(
                    "Concurrency group '{}' is busy: run {} is in progress (pid {})",
                    group,
                    holder.run_id,
                    holder.pid
                );
            }
            cancel_holder(runs_dir, &holder)?;
            lock::remove_lock(locks_dir, group)?;
        } else {
            lock::remove_lock(locks_dir, group)?;
        }
    }

    lock::create_lock(locks_dir, group, run_id)?;
    Ok(GroupGuard {
        locks_dir: locks_dir.to_path_buf(),
        group: group.to_string(),
    })
}

/// Cancel the run holding a group: write its cancel flag so it winds down
/// between steps, and nudge the process with SIGTERM.
fn cancel_holder(runs_dir: &Path, holder: &lock::LockInfo) -> Result<()> {
    if !holder.run_id.is_empty() {
        runs::request_cancel(runs_dir, &holder.run_id)?;
    }
    // Best effort: the holder may exit on its own between the liveness
    // probe and the signal.
    let _ = lock::stop_process(holder.pid);
    Ok(())
}
