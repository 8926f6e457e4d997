//! # Cadence - Local CI Workflow Execution
//!
//! Cadence is a CI/CD pipeline engine that runs declarative workflow files
//! on the local machine: trigger matching, matrix fan-out, dependency-ordered
//! jobs, step execution, and dependency caching.
//!
//! ## Overview
//!
//! Workflows are YAML files describing triggers, jobs, and steps. The cadence
//! CLI evaluates which workflows an event triggers, expands each job's matrix
//! into independent instances, orders jobs by their `needs` declarations, and
//! executes steps through the shell, recording every run under `.cadence/runs`.
//!
//! ## Core Concepts
//!
//! - **Workflows**: YAML files declaring triggers, jobs, and ordered steps
//! - **Matrix**: declarative fan-out producing one job instance per combination
//! - **Runs**: persisted records of every execution, with per-step conclusions
//!
//! ## Modules
//!
//! - [`workflow`] - Workflow file model and parsing
//! - [`trigger`] - Event matching against trigger declarations
//! - [`matrix`] - Matrix strategy expansion
//! - [`graph`] - Job dependency ordering
//! - [`expr`] - `${{ ... }}` interpolation and `if:` conditions
//! - [`scheduler`] - Run orchestration
//! - [`runner`] - Step execution
//! - [`runs`] - Run records and status
//! - [`cache`] - Keyed dependency cache
//! - [`concurrency`] - Concurrency groups and cancel-in-progress
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use cadence::trigger::{Event, EventKind};
//! use cadence::workflow::Workflow;
//!
//! let workflow = Workflow::load(Path::new(".cadence/workflows/ci.yml"))
//!     .expect("Failed to load workflow");
//!
//! let event = Event::new(EventKind::PullRequest, "main");
//! if cadence::trigger::matches(&workflow, &event) {
//!     println!("{} would run", workflow.display_name());
//! }
//! ```

// Re-export all public modules
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod expr;
pub mod graph;
pub mod id;
pub mod lock;
pub mod matrix;
pub mod runner;
pub mod runs;
pub mod scheduler;
pub mod templates;
pub mod trigger;
pub mod ui;
pub mod validation;
pub mod workflow;

/// Default path constants for the cadence directory structure.
pub mod paths {
    /// Directory containing workflow files: `.cadence/workflows`
    pub const WORKFLOWS_DIR: &str = ".cadence/workflows";
    /// Directory containing run records: `.cadence/runs`
    pub const RUNS_DIR: &str = ".cadence/runs";
    /// Directory containing job logs: `.cadence/logs`
    pub const LOGS_DIR: &str = ".cadence/logs";
    /// Directory containing cache entries: `.cadence/cache`
    pub const CACHE_DIR: &str = ".cadence/cache";
    /// Directory containing concurrency lock files: `.cadence/.locks`
    pub const LOCKS_DIR: &str = ".cadence/.locks";
    /// Project configuration file: `.cadence/config.yml`
    pub const CONFIG_FILE: &str = ".cadence/config.yml";
}

/// Generate a UTC timestamp in ISO 8601 format: `YYYY-MM-DDTHH:MM:SSZ`
///
/// This function uses `chrono::Utc::now()` to ensure the timestamp is truly in UTC,
/// not local time with a misleading `Z` suffix.
pub fn utc_now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
