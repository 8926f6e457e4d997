//! Run records: the persisted state of every workflow execution.
//!
//! Each run is a YAML file under `.cadence/runs/`, updated in place as the
//! run progresses. Writes go through a temp file and an atomic rename so a
//! concurrent `status` never reads a half-written record.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::matrix::Combination;
use crate::utc_now_iso;

/// Lifecycle status of a run, job instance, or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
}

/// Final outcome, set once status is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Success,
    Failure,
    Skipped,
    Cancelled,
}

impl std::fmt::Display for Conclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Conclusion::Success => write!(f, "success"),
            Conclusion::Failure => write!(f, "failure"),
            Conclusion::Skipped => write!(f, "skipped"),
            Conclusion::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl Conclusion {
    /// Combine two conclusions, keeping the worse one.
    /// Severity: failure > cancelled > success > skipped.
    pub fn worst(self, other: Conclusion) -> Conclusion {
        fn rank(c: Conclusion) -> u8 {
            match c {
                Conclusion::Failure => 3,
                Conclusion::Cancelled => 2,
                Conclusion::Success => 1,
                Conclusion::Skipped => 0,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

/// Record of a single step within a job instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub status: Status,
    pub conclusion: Option<Conclusion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl StepRecord {
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: Status::Pending,
            conclusion: None,
            exit_code: None,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Record of one job instance (one matrix combination of one job).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job id from the workflow file.
    pub job_id: String,
    /// Display name, including the matrix label for matrix legs.
    pub name: String,
    #[serde(default, skip_serializing_if = "Combination::is_empty")]
    pub matrix: Combination,
    pub status: Status,
    pub conclusion: Option<Conclusion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

impl JobRecord {
    /// Conclusion, treating unfinished instances as failures for gating.
    pub fn effective_conclusion(&self) -> Conclusion {
        self.conclusion.unwrap_or(Conclusion::Failure)
    }
}

/// Record of a full workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    /// Workflow display name.
    pub workflow: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_file: Option<String>,
    pub event: String,
    pub git_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_group: Option<String>,
    pub status: Status,
    pub conclusion: Option<Conclusion>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default)]
    pub jobs: Vec<JobRecord>,
}

impl RunRecord {
    pub fn new(id: &str, workflow: &str, event: &str, git_ref: &str) -> Self {
        Self {
            id: id.to_string(),
            workflow: workflow.to_string(),
            workflow_file: None,
            event: event.to_string(),
            git_ref: git_ref.to_string(),
            concurrency_group: None,
            status: Status::Pending,
            conclusion: None,
            created_at: utc_now_iso(),
            completed_at: None,
            pid: Some(std::process::id()),
            jobs: Vec::new(),
        }
    }

    /// Persist the record atomically into the runs directory.
    pub fn save(&self, runs_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(runs_dir)
            .with_context(|| format!("Failed to create {}", runs_dir.display()))?;
        let content = serde_yaml::to_string(self).context("Failed to serialize run record")?;

        let mut tmp = tempfile::NamedTempFile::new_in(runs_dir)
            .context("Failed to create temp file for run record")?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(run_path(runs_dir, &self.id))
            .with_context(|| format!("Failed to write run record for {}", self.id))?;
        Ok(())
    }

    pub fn load(runs_dir: &Path, id: &str) -> Result<Self> {
        let path = run_path(runs_dir, id);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run record {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse run record {}", path.display()))
    }

    /// Mark the run completed with the given conclusion.
    pub fn complete(&mut self, conclusion: Conclusion) {
        self.status = Status::Completed;
        self.conclusion = Some(conclusion);
        self.completed_at = Some(utc_now_iso());
        self.pid = None;
    }

    /// All instance records for a given job id.
    pub fn instances_of(&self, job_id: &str) -> Vec<&JobRecord> {
        self.jobs.iter().filter(|j| j.job_id == job_id).collect()
    }
}

/// Path of a run record file.
pub fn run_path(runs_dir: &Path, id: &str) -> PathBuf {
    runs_dir.join(format!("{}.yml", id))
}

/// Load all run records, newest id first.
pub fn load_all(runs_dir: &Path) -> Result<Vec<RunRecord>> {
    let mut runs = Vec::new();
    if !runs_dir.exists() {
        return Ok(runs);
    }
    for entry in std::fs::read_dir(runs_dir)
        .with_context(|| format!("Failed to read {}", runs_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                runs.push(RunRecord::load(runs_dir, id)?);
            }
        }
    }
    runs.sort_by(|a, b| b.id.cmp(&a.id));
    Ok(runs)
}

/// All recorded run ids, newest first.
pub fn list_ids(runs_dir: &Path) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    if !runs_dir.exists() {
        return Ok(ids);
    }
    for entry in std::fs::read_dir(runs_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("yml") {
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(id.to_string());
            }
        }
    }
    ids.sort_by(|a, b| b.cmp(a));
    Ok(ids)
}

/// Path of the cancel flag for a run. Writing it requests cooperative
/// cancellation; the running process checks it between steps.
pub fn cancel_flag_path(runs_dir: &Path, id: &str) -> PathBuf {
    runs_dir.join(format!("{}.cancel", id))
}

/// Request cancellation of a run.
pub fn request_cancel(runs_dir: &Path, id: &str) -> Result<()> {
    std::fs::create_dir_all(runs_dir)?;
    std::fs::write(cancel_flag_path(runs_dir, id), utc_now_iso())
        .with_context(|| format!("Failed to write cancel flag for {}", id))?;
    Ok(())
}

pub fn is_cancel_requested(runs_dir: &Path, id: &str) -> bool {
    cancel_flag_path(runs_dir, id).exists()
}

/// Remove the cancel flag once the run has wound down.
pub fn clear_cancel(runs_dir: &Path, id: &str) -> Result<()> {
    let path = cancel_flag_path(runs_dir, id);
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_run(id: &str) -> RunRecord {
        let mut run = RunRecord::new(id, "CI", "pull_request", "main");
        run.jobs.push(JobRecord {
            job_id: "unit-testing".to_string(),
            name: "unit-testing (3.10)".to_string(),
            matrix: [("python-version".to_string(), "3.10".to_string())]
                .into_iter()
                .collect(),
            status: Status::Completed,
            conclusion: Some(Conclusion::Success),
            started_at: None,
            completed_at: None,
            log_file: None,
            steps: vec![StepRecord::pending("Install")],
        });
        run
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let run = sample_run("2026-08-29-001-abc");
        run.save(tmp.path()).unwrap();

        let loaded = RunRecord::load(tmp.path(), "2026-08-29-001-abc").unwrap();
        assert_eq!(loaded.id, run.id);
        assert_eq!(loaded.workflow, "CI");
        assert_eq!(loaded.jobs.len(), 1);
        assert_eq!(loaded.jobs[0].matrix.get("python-version").unwrap(), "3.10");
    }

    #[test]
    fn test_load_all_newest_first() {
        let tmp = TempDir::new().unwrap();
        sample_run("2026-08-29-001-abc").save(tmp.path()).unwrap();
        sample_run("2026-08-29-002-def").save(tmp.path()).unwrap();

        let runs = load_all(tmp.path()).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, "2026-08-29-002-def");
    }

    #[test]
    fn test_load_all_empty_dir_missing() {
        let tmp = TempDir::new().unwrap();
        let runs = load_all(&tmp.path().join("nope")).unwrap();
        assert!(runs.is_empty());
    }

    #[test]
    fn test_complete_sets_fields() {
        let mut run = sample_run("2026-08-29-001-abc");
        run.complete(Conclusion::Failure);
        assert_eq!(run.status, Status::Completed);
        assert_eq!(run.conclusion, Some(Conclusion::Failure));
        assert!(run.completed_at.is_some());
        assert!(run.pid.is_none());
    }

    #[test]
    fn test_cancel_flag_lifecycle() {
        let tmp = TempDir::new().unwrap();
        assert!(!is_cancel_requested(tmp.path(), "2026-08-29-001-abc"));
        request_cancel(tmp.path(), "2026-08-29-001-abc").unwrap();
        assert!(is_cancel_requested(tmp.path(), "2026-08-29-001-abc"));
        clear_cancel(tmp.path(), "2026-08-29-001-abc").unwrap();
        assert!(!is_cancel_requested(tmp.path(), "2026-08-29-001-abc"));
    }

    #[test]
    fn test_conclusion_worst() {
        assert_eq!(
            Conclusion::Success.worst(Conclusion::Failure),
            Conclusion::Failure
        );
        assert_eq!(
            Conclusion::Failure.worst(Conclusion::Cancelled),
            Conclusion::Failure
        );
        assert_eq!(
            Conclusion::Skipped.worst(Conclusion::Success),
            Conclusion::Success
        );
    }
}
