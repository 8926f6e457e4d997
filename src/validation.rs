//! Workflow file validation.
//!
//! Validation runs in three layers: the YAML must parse, the document must
//! satisfy the embedded workflow schema, and the parsed workflow must pass
//! the semantic checks (dependency graph, step shape, pinned action refs,
//! expression syntax, filter globs). Warnings flag things that will run
//! but probably not as intended; `--strict` promotes them to errors.

use colored::Colorize;
use std::path::Path;
use std::sync::OnceLock;

use crate::expr;
use crate::graph::JobGraph;
use crate::trigger;
use crate::workflow::{EventKind, Job, Workflow};

/// Severity level for validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Info - worth knowing, never fails validation
    Info,
    /// Warning - should be addressed but not critical
    Warning,
    /// Error - must be fixed
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A single validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// Location within the workflow (`jobs.test.steps[2]`, `on.push`, ...)
    pub location: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn error(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            location: location.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn warning(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            location: location.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn info(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Info,
            location: location.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Display the issue with colored output
    pub fn display(&self) {
        let icon = match self.severity {
            Severity::Info => "ℹ".blue(),
            Severity::Warning => "⚠".yellow(),
            Severity::Error => "✗".red(),
        };
        println!("  {} {}: {}", icon, self.location.cyan(), self.message);
        if let Some(ref suggestion) = self.suggestion {
            println!("      {} {}", "→".cyan(), suggestion);
        }
    }
}

/// Result of validating one workflow file
#[derive(Debug)]
pub struct ValidationResult {
    /// File (or other label) the issues belong to.
    pub item: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Whether validation passed. Strict mode counts warnings as failures;
    /// info issues never fail either way.
    pub fn is_valid(&self, strict: bool) -> bool {
        if strict {
            self.issues
                .iter()
                .all(|i| i.severity == Severity::Info)
        } else {
            self.error_count() == 0
        }
    }

    /// Display the file's issues, or a pass line if there are none.
    pub fn display(&self, strict: bool) {
        if self.is_valid(strict) && self.issues.is_empty() {
            println!("{} {}", "✓".green(), self.item.cyan());
            return;
        }
        let icon = if self.is_valid(strict) {
            "⚠".yellow()
        } else {
            "✗".red()
        };
        println!("{} {}", icon, self.item.cyan());
        for issue in &self.issues {
            issue.display();
        }
    }
}

/// Validate a workflow file on disk.
pub fn validate_file(path: &Path) -> ValidationResult {
    let item = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            return ValidationResult {
                item,
                issues: vec![ValidationIssue::error(
                    "file",
                    format!("Failed to read file: {}", err),
                )],
            };
        }
    };

    ValidationResult {
        item,
        issues: validate_content(&content),
    }
}

/// Validate workflow YAML content through every layer.
pub fn validate_content(content: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    // The document must be YAML before anything else can be said about it.
    let doc: serde_json::Value = match serde_yaml::from_str(content) {
        Ok(doc) => doc,
        Err(err) => {
            issues.push(ValidationIssue::error("file", format!("Invalid YAML: {}", err)));
            return issues;
        }
    };

    issues.extend(schema_issues(&doc));

    match Workflow::parse(content) {
        Ok(workflow) => issues.extend(validate_workflow(&workflow)),
        Err(err) => {
            issues.push(ValidationIssue::error("file", format!("{:#}", err)));
        }
    }
    issues
}

/// Top-level shape of a workflow document. Semantic checks go deeper; this
/// catches misspelled top-level keys and wrongly typed blocks early with
/// schema-quality messages.
const WORKFLOW_SCHEMA: &str = r#"{
    "$schema": "https://json-schema.org/draft/2020-12/schema",
    "type": "object",
    "required": ["on", "jobs"],
    "properties": {
        "name": {"type": "string"},
        "on": {"type": ["string", "array", "object"]},
        "env": {"type": "object"},
        "concurrency": {"type": ["string", "object"]},
        "jobs": {
            "type": "object",
            "minProperties": 1,
            "additionalProperties": {"type": "object"}
        }
    },
    "additionalProperties": false
}"#;

fn workflow_schema() -> &'static jsonschema::Validator {
    static SCHEMA: OnceLock<jsonschema::Validator> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let schema: serde_json::Value =
            serde_json::from_str(WORKFLOW_SCHEMA).expect("embedded schema is valid JSON");
        jsonschema::validator_for(&schema).expect("embedded schema compiles")
    })
}

fn schema_issues(doc: &serde_json::Value) -> Vec<ValidationIssue> {
    workflow_schema()
        .iter_errors(doc)
        .map(|err| {
            let path = err.instance_path.to_string();
            let location = if path.is_empty() {
                "file".to_string()
            } else {
                path
            };
            ValidationIssue::error(location, err.to_string())
        })
        .collect()
}

/// Semantic checks on a parsed workflow.
pub fn validate_workflow(workflow: &Workflow) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if let Err(err) = JobGraph::build(workflow) {
        issues.push(ValidationIssue::error("jobs", format!("{:#}", err)));
    }

    for (kind, filter) in &workflow.on.entries {
        let location = format!("on.{}", kind);
        let all_patterns = filter
            .branches
            .iter()
            .chain(&filter.branches_ignore)
            .chain(&filter.paths)
            .chain(&filter.paths_ignore);
        for pattern in all_patterns {
            if let Err(err) = trigger::check_pattern(pattern) {
                issues.push(ValidationIssue::error(
                    &location,
                    format!("Invalid glob pattern '{}': {}", pattern, err),
                ));
            }
        }

        let has_filters = *filter != crate::workflow::TriggerFilter::default();
        if *kind == EventKind::WorkflowDispatch && has_filters {
            issues.push(ValidationIssue::info(
                &location,
                "Branch and path filters are ignored for workflow_dispatch",
            ));
        }
    }

    if let Some(concurrency) = &workflow.concurrency {
        if concurrency.group.trim().is_empty() {
            issues.push(ValidationIssue::error(
                "concurrency",
                "Concurrency group must not be empty",
            ));
        } else if let Err(err) = expr::check_template(&concurrency.group) {
            issues.push(ValidationIssue::error("concurrency", format!("{:#}", err)));
        }
    }

    for (job_id, job) in &workflow.jobs {
        issues.extend(validate_job(job_id, job));
    }
    issues
}

fn validate_job(job_id: &str, job: &Job) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let location = format!("jobs.{}", job_id);

    if job.steps.is_empty() {
        issues.push(ValidationIssue::warning(&location, "Job has no steps"));
    }

    if let Some(condition) = &job.if_expr {
        if let Err(err) = expr::check(condition) {
            issues.push(ValidationIssue::error(
                &location,
                format!("Invalid 'if' condition: {:#}", err),
            ));
        }
    }

    if let Some(strategy) = &job.strategy {
        if strategy.max_parallel == Some(0) {
            issues.push(ValidationIssue::warning(
                format!("jobs.{}.strategy", job_id),
                "A max-parallel of 0 is treated as 1",
            ));
        }
        if let Some(matrix) = &strategy.matrix {
            for (axis, values) in &matrix.axes {
                if values.is_empty() {
                    issues.push(ValidationIssue::error(
                        format!("{}.strategy.matrix.{}", job_id, axis),
                        "Matrix axis has no values",
                    ));
                }
            }
            if matrix.axes.is_empty() && matrix.include.is_empty() {
                issues.push(ValidationIssue::warning(
                    format!("jobs.{}.strategy.matrix", job_id),
                    "Matrix declares no axes and no include entries",
                ));
            }
        }
    }

    let mut seen_ids: Vec<&str> = Vec::new();
    for (index, step) in job.steps.iter().enumerate() {
        let step_location = format!("jobs.{}.steps[{}]", job_id, index);

        match (&step.run, &step.uses) {
            (Some(_), Some(_)) => issues.push(ValidationIssue::error(
                &step_location,
                "Step declares both 'run' and 'uses'; pick one",
            )),
            (None, None) => issues.push(ValidationIssue::error(
                &step_location,
                "Step declares neither 'run' nor 'uses'",
            )),
            (Some(script), None) => {
                if let Err(err) = expr::check_template(script) {
                    issues.push(ValidationIssue::error(
                        &step_location,
                        format!("{:#}", err),
                    ));
                }
            }
            (None, Some(uses)) => issues.extend(check_uses(&step_location, uses)),
        }

        if let Some(condition) = &step.if_expr {
            if let Err(err) = expr::check(condition) {
                issues.push(ValidationIssue::error(
                    &step_location,
                    format!("Invalid 'if' condition: {:#}", err),
                ));
            }
        }

        if step.is_cache_action() {
            for field in ["path", "key"] {
                if !step.with.contains_key(field) {
                    issues.push(ValidationIssue::error(
                        &step_location,
                        format!("Cache step is missing 'with.{}'", field),
                    ));
                }
            }
            for value in step.with.values() {
                if let Err(err) = expr::check_template(value) {
                    issues.push(ValidationIssue::error(
                        &step_location,
                        format!("{:#}", err),
                    ));
                }
            }
        }

        if step.timeout_minutes == Some(0) {
            issues.push(ValidationIssue::warning(
                &step_location,
                "A timeout of 0 minutes fails the step immediately",
            ));
        }

        if let Some(id) = &step.id {
            if seen_ids.contains(&id.as_str()) {
                issues.push(ValidationIssue::error(
                    &step_location,
                    format!("Duplicate step id '{}'", id),
                ));
            }
            seen_ids.push(id);
        }
    }
    issues
}

/// Action references must be pinned `owner/repo@ref`. A mutable branch ref
/// is allowed but flagged.
fn check_uses(location: &str, uses: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let Some((repo, git_ref)) = uses.split_once('@') else {
        issues.push(
            ValidationIssue::error(
                location,
                format!("Action reference '{}' is not pinned", uses),
            )
            .with_suggestion("Use the form owner/repo@ref"),
        );
        return issues;
    };

    let repo_ok = {
        let mut parts = repo.splitn(2, '/');
        let owner = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        !owner.is_empty() && !name.is_empty()
    };
    if !repo_ok || git_ref.is_empty() {
        issues.push(ValidationIssue::error(
            location,
            format!("Malformed action reference '{}'", uses),
        ));
        return issues;
    }

    if matches!(git_ref, "main" | "master" | "latest") {
        issues.push(
            ValidationIssue::warning(
                location,
                format!("Action '{}' is pinned to a mutable ref", uses),
            )
            .with_suggestion("Pin to a tag or commit SHA"),
        );
    }
    issues
}
