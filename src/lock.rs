//! Lock file operations for concurrency group tracking.
//!
//! A lock file records which process is running a concurrency group and
//! which run it belongs to. Staleness is decided by probing the recorded
//! pid for liveness.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Contents of a concurrency lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub pid: u32,
    pub run_id: String,
}

/// Create a lock file for a group, recording the current process and run.
pub fn create_lock(locks_dir: &Path, group: &str, run_id: &str) -> Result<PathBuf> {
    let lock_path = lock_path(locks_dir, group);
    fs::create_dir_all(locks_dir)
        .with_context(|| format!("Failed to create {}", locks_dir.display()))?;
    fs::write(&lock_path, format!("{}\n{}", std::process::id(), run_id))?;
    Ok(lock_path)
}

/// Remove the lock file for a group.
pub fn remove_lock(locks_dir: &Path, group: &str) -> Result<()> {
    let lock_path = lock_path(locks_dir, group);
    if lock_path.exists() {
        fs::remove_file(&lock_path)?;
    }
    Ok(())
}

/// Read the lock for a group, if present.
pub fn read_lock(locks_dir: &Path, group: &str) -> Result<Option<LockInfo>> {
    let lock_path = lock_path(locks_dir, group);

    if !lock_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(&lock_path)
        .with_context(|| format!("Failed to read lock file {}", lock_path.display()))?;
    let mut lines = content.lines();
    let pid: u32 = lines
        .next()
        .unwrap_or("")
        .trim()
        .parse()
        .with_context(|| format!("Invalid pid in lock file {}", lock_path.display()))?;
    let run_id = lines.next().unwrap_or("").trim().to_string();
    Ok(Some(LockInfo { pid, run_id }))
}

/// Check if a process with the given PID is running.
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // Signal 0 probes for existence without delivering anything.
        // EPERM still means the process exists.
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Send SIGTERM to a process.
pub fn stop_process(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        )
        .with_context(|| format!("Failed to send SIGTERM to process {}", pid))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        anyhow::bail!("Process termination not implemented for this platform (pid {})", pid);
    }
}

/// Remove lock files whose recorded process is no longer running.
/// Returns how many were cleaned.
pub fn cleanup_stale_locks(locks_dir: &Path) -> Result<usize> {
    if !locks_dir.exists() {
        return Ok(0);
    }
    let mut cleaned = 0;
    for entry in fs::read_dir(locks_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("lock") {
            continue;
        }
        let content = fs::read_to_string(&path)?;
        let pid: Option<u32> = content.lines().next().and_then(|l| l.trim().parse().ok());
        let stale = match pid {
            Some(pid) => !is_process_running(pid),
            None => true,
        };
        if stale {
            fs::remove_file(&path)?;
            cleaned += 1;
        }
    }
    Ok(cleaned)
}

fn lock_path(locks_dir: &Path, group: &str) -> PathBuf {
    locks_dir.join(format!("{}.lock", sanitize_group(group)))
}

/// Group keys are interpolated user strings; keep the file name safe.
fn sanitize_group(group: &str) -> String {
    group
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
