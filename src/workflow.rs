//! Workflow file model and parsing.
//!
//! Workflows are YAML files declaring triggers (`on`), an optional
//! concurrency group, and an ordered mapping of jobs. Parsing accepts the
//! shorthand forms real workflow files use (`on: push`, `needs: build`,
//! `concurrency: group-name`) alongside the full mapping forms.

use anyhow::{anyhow, bail, Context, Result};
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Event kinds a workflow can be triggered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    WorkflowDispatch,
}

impl EventKind {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "push" => Ok(EventKind::Push),
            "pull_request" => Ok(EventKind::PullRequest),
            "workflow_dispatch" => Ok(EventKind::WorkflowDispatch),
            other => Err(anyhow!(
                "Unknown trigger event '{}' (expected push, pull_request, or workflow_dispatch)",
                other
            )),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Push => write!(f, "push"),
            EventKind::PullRequest => write!(f, "pull_request"),
            EventKind::WorkflowDispatch => write!(f, "workflow_dispatch"),
        }
    }
}

/// Branch and path filters attached to a trigger declaration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TriggerFilter {
    #[serde(default)]
    pub branches: Vec<String>,
    #[serde(default, rename = "branches-ignore")]
    pub branches_ignore: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default, rename = "paths-ignore")]
    pub paths_ignore: Vec<String>,
}

/// The `on:` block, normalized from its three YAML shapes:
/// a single event name, a list of event names, or a mapping of
/// event name to filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Triggers {
    pub entries: Vec<(EventKind, TriggerFilter)>,
}

impl Triggers {
    /// Returns the filter for an event kind if the workflow declares it.
    pub fn get(&self, kind: EventKind) -> Option<&TriggerFilter> {
        self.entries.iter().find(|(k, _)| *k == kind).map(|(_, f)| f)
    }

    pub fn declares(&self, kind: EventKind) -> bool {
        self.get(kind).is_some()
    }
}

impl<'de> Deserialize<'de> for Triggers {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        triggers_from_value(&value).map_err(de::Error::custom)
    }
}

fn triggers_from_value(value: &serde_yaml::Value) -> Result<Triggers> {
    let mut entries = Vec::new();
    match value {
        serde_yaml::Value::String(name) => {
            entries.push((EventKind::parse(name)?, TriggerFilter::default()));
        }
        serde_yaml::Value::Sequence(names) => {
            for item in names {
                let name = item
                    .as_str()
                    .ok_or_else(|| anyhow!("Trigger list entries must be event names"))?;
                entries.push((EventKind::parse(name)?, TriggerFilter::default()));
            }
        }
        serde_yaml::Value::Mapping(map) => {
            for (key, val) in map {
                let name = key
                    .as_str()
                    .ok_or_else(|| anyhow!("Trigger keys must be event names"))?;
                let kind = EventKind::parse(name)?;
                let filter = match val {
                    serde_yaml::Value::Null => TriggerFilter::default(),
                    other => serde_yaml::from_value(other.clone())
                        .with_context(|| format!("Invalid filter for trigger '{}'", name))?,
                };
                entries.push((kind, filter));
            }
        }
        _ => bail!("The 'on' field must be an event name, a list, or a mapping"),
    }
    if entries.is_empty() {
        bail!("The 'on' field declares no trigger events");
    }
    Ok(Triggers { entries })
}

/// A field that accepts either a single string or a list of strings
/// (`needs: build` vs `needs: [build, lint]`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StringOrSeq {
    One(String),
    Many(Vec<String>),
}

impl StringOrSeq {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            StringOrSeq::One(s) => vec![s.clone()],
            StringOrSeq::Many(v) => v.clone(),
        }
    }
}

/// Concurrency group declaration, normalized from the string shorthand
/// or the `{group, cancel-in-progress}` mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Concurrency {
    pub group: String,
    pub cancel_in_progress: bool,
}

impl<'de> Deserialize<'de> for Concurrency {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Full {
            group: String,
            #[serde(default, rename = "cancel-in-progress")]
            cancel_in_progress: bool,
        }

        let value = serde_yaml::Value::deserialize(deserializer)?;
        match value {
            serde_yaml::Value::String(group) => Ok(Concurrency {
                group,
                cancel_in_progress: false,
            }),
            other => {
                let full: Full = serde_yaml::from_value(other).map_err(de::Error::custom)?;
                Ok(Concurrency {
                    group: full.group,
                    cancel_in_progress: full.cancel_in_progress,
                })
            }
        }
    }
}

/// Matrix declaration: ordered axes plus include/exclude adjustments.
///
/// Axis order and value order are preserved from the file so expansion
/// is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Matrix {
    pub axes: Vec<(String, Vec<serde_yaml::Value>)>,
    pub include: Vec<BTreeMap<String, serde_yaml::Value>>,
    pub exclude: Vec<BTreeMap<String, serde_yaml::Value>>,
}

impl<'de> Deserialize<'de> for Matrix {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = serde_yaml::Mapping::deserialize(deserializer)?;
        matrix_from_mapping(&map).map_err(de::Error::custom)
    }
}

fn matrix_from_mapping(map: &serde_yaml::Mapping) -> Result<Matrix> {
    let mut matrix = Matrix::default();
    for (key, val) in map {
        let name = key
            .as_str()
            .ok_or_else(|| anyhow!("Matrix keys must be strings"))?;
        match name {
            "include" | "exclude" => {
                let entries: Vec<BTreeMap<String, serde_yaml::Value>> =
                    serde_yaml::from_value(val.clone())
                        .with_context(|| format!("Invalid matrix '{}' list", name))?;
                if name == "include" {
                    matrix.include = entries;
                } else {
                    matrix.exclude = entries;
                }
            }
            axis => {
                let values: Vec<serde_yaml::Value> = serde_yaml::from_value(val.clone())
                    .with_context(|| format!("Matrix axis '{}' must be a list of values", axis))?;
                matrix.axes.push((axis.to_string(), values));
            }
        }
    }
    Ok(matrix)
}

fn default_fail_fast() -> bool {
    true
}

/// The `strategy` block of a job.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Strategy {
    #[serde(default)]
    pub matrix: Option<Matrix>,
    #[serde(default = "default_fail_fast", rename = "fail-fast")]
    pub fail_fast: bool,
    #[serde(default, rename = "max-parallel")]
    pub max_parallel: Option<usize>,
}

impl Default for Strategy {
    fn default() -> Self {
        Self {
            matrix: None,
            fail_fast: true,
            max_parallel: None,
        }
    }
}

/// Per-job defaults applied to every `run` step.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Defaults {
    #[serde(default)]
    pub run: RunDefaults,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RunDefaults {
    pub shell: Option<String>,
    #[serde(rename = "working-directory")]
    pub working_directory: Option<String>,
}

/// A single step: either an inline shell command (`run`) or a pinned
/// external action reference (`uses`).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Step {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "if")]
    pub if_expr: Option<String>,
    pub uses: Option<String>,
    pub run: Option<String>,
    pub shell: Option<String>,
    #[serde(rename = "working-directory")]
    pub working_directory: Option<String>,
    #[serde(default, deserialize_with = "de_scalar_map")]
    pub env: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "de_scalar_map")]
    pub with: BTreeMap<String, String>,
    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: bool,
    #[serde(rename = "timeout-minutes")]
    pub timeout_minutes: Option<u64>,
}

impl Step {
    /// Display name: explicit `name`, else the action ref, else the first
    /// line of the run script, else a positional label.
    pub fn display_name(&self, index: usize) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        if let Some(uses) = &self.uses {
            return format!("Run {}", uses);
        }
        if let Some(run) = &self.run {
            if let Some(first) = run.lines().find(|l| !l.trim().is_empty()) {
                return first.trim().to_string();
            }
        }
        format!("step {}", index + 1)
    }

    /// Whether this step invokes the built-in cache action.
    pub fn is_cache_action(&self) -> bool {
        match &self.uses {
            Some(uses) => {
                uses.starts_with("cadence/cache@") || uses.starts_with("actions/cache@")
            }
            None => false,
        }
    }
}

/// A job: a unit of work composed of ordered steps, run once per matrix
/// combination.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Job {
    pub name: Option<String>,
    #[serde(rename = "runs-on")]
    pub runs_on: Option<StringOrSeq>,
    pub needs: Option<StringOrSeq>,
    #[serde(rename = "if")]
    pub if_expr: Option<String>,
    #[serde(default, deserialize_with = "de_scalar_map")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: bool,
    #[serde(rename = "timeout-minutes")]
    pub timeout_minutes: Option<u64>,
}

impl Job {
    /// The job ids this job depends on, in declaration order.
    pub fn needs_list(&self) -> Vec<String> {
        self.needs.as_ref().map(|n| n.as_vec()).unwrap_or_default()
    }

    /// Runner labels this job requests.
    pub fn runs_on_labels(&self) -> Vec<String> {
        self.runs_on.as_ref().map(|r| r.as_vec()).unwrap_or_default()
    }
}

/// A parsed workflow file.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub name: Option<String>,
    pub on: Triggers,
    pub env: BTreeMap<String, String>,
    pub concurrency: Option<Concurrency>,
    /// Jobs in declaration order.
    pub jobs: Vec<(String, Job)>,
    /// Source file, when loaded from disk.
    pub path: Option<PathBuf>,
}

#[derive(Deserialize)]
struct RawWorkflow {
    name: Option<String>,
    on: Triggers,
    #[serde(default, deserialize_with = "de_scalar_map")]
    env: BTreeMap<String, String>,
    #[serde(default)]
    concurrency: Option<Concurrency>,
    jobs: serde_yaml::Mapping,
}

impl Workflow {
    /// Parse a workflow from YAML content.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawWorkflow =
            serde_yaml::from_str(content).context("Failed to parse workflow YAML")?;

        let mut jobs = Vec::new();
        for (key, val) in &raw.jobs {
            let job_id = key
                .as_str()
                .ok_or_else(|| anyhow!("Job ids must be strings"))?
                .to_string();
            let job: Job = serde_yaml::from_value(val.clone())
                .with_context(|| format!("Invalid definition for job '{}'", job_id))?;
            jobs.push((job_id, job));
        }

        if jobs.is_empty() {
            bail!("Workflow declares no jobs");
        }

        Ok(Workflow {
            name: raw.name,
            on: raw.on,
            env: raw.env,
            concurrency: raw.concurrency,
            jobs,
            path: None,
        })
    }

    /// Load a workflow from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow from {}", path.display()))?;
        let mut workflow = Self::parse(&content)
            .with_context(|| format!("Failed to parse workflow {}", path.display()))?;
        workflow.path = Some(path.to_path_buf());
        Ok(workflow)
    }

    /// Load every `.yml`/`.yaml` workflow in a directory, sorted by file name.
    pub fn load_all(workflows_dir: &Path) -> Result<Vec<Workflow>> {
        let mut workflows = Vec::new();
        if !workflows_dir.exists() {
            return Ok(workflows);
        }
        let mut paths: Vec<PathBuf> = std::fs::read_dir(workflows_dir)
            .with_context(|| format!("Failed to read {}", workflows_dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|s| s.to_str()),
                    Some("yml") | Some("yaml")
                )
            })
            .collect();
        paths.sort();
        for path in paths {
            workflows.push(Self::load(&path)?);
        }
        Ok(workflows)
    }

    /// The workflow's display name: the `name` field, else the file stem.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        self.path
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unnamed".to_string())
    }

    /// Look up a job by id.
    pub fn job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|(jid, _)| jid == id).map(|(_, j)| j)
    }
}

/// Deserialize a YAML mapping of scalars into string/string pairs,
/// stringifying bare numbers and booleans (`PYTHON_VERSION: 3.11`).
fn de_scalar_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map = serde_yaml::Mapping::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    for (key, val) in map {
        let key = key
            .as_str()
            .ok_or_else(|| de::Error::custom("map keys must be strings"))?
            .to_string();
        out.insert(key, scalar_to_string(&val).map_err(de::Error::custom)?);
    }
    Ok(out)
}

/// Render a scalar YAML value as the string a shell would see.
pub fn scalar_to_string(value: &serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Null => Ok(String::new()),
        other => Err(anyhow!("Expected a scalar value, got {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name: CI
on:
  pull_request:
    branches: [main]
    paths:
      - "**.py"
      - pyproject.toml
  workflow_dispatch:
concurrency:
  group: ci-${{ event.ref }}
  cancel-in-progress: true
env:
  LOG_LEVEL: info
jobs:
  unit-testing:
    runs-on: ubuntu-latest
    strategy:
      fail-fast: false
      matrix:
        python-version: ["3.10", "3.11"]
    steps:
      - name: Install
        run: make install
      - name: Test
        run: make unit-testing
        continue-on-error: false
  integration-testing:
    needs: unit-testing
    runs-on: ubuntu-latest
    steps:
      - run: make integration-testing
"#;

    #[test]
    fn test_parse_full_workflow() {
        let wf = Workflow::parse(FULL).unwrap();
        assert_eq!(wf.name.as_deref(), Some("CI"));
        assert!(wf.on.declares(EventKind::PullRequest));
        assert!(wf.on.declares(EventKind::WorkflowDispatch));
        assert!(!wf.on.declares(EventKind::Push));

        let filter = wf.on.get(EventKind::PullRequest).unwrap();
        assert_eq!(filter.branches, vec!["main"]);
        assert_eq!(filter.paths.len(), 2);

        let concurrency = wf.concurrency.as_ref().unwrap();
        assert_eq!(concurrency.group, "ci-${{ event.ref }}");
        assert!(concurrency.cancel_in_progress);
    }

    #[test]
    fn test_jobs_preserve_declaration_order() {
        let wf = Workflow::parse(FULL).unwrap();
        let ids: Vec<&str> = wf.jobs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["unit-testing", "integration-testing"]);
    }

    #[test]
    fn test_needs_shorthand() {
        let wf = Workflow::parse(FULL).unwrap();
        let job = wf.job("integration-testing").unwrap();
        assert_eq!(job.needs_list(), vec!["unit-testing"]);
    }

    #[test]
    fn test_matrix_axes_ordered() {
        let wf = Workflow::parse(FULL).unwrap();
        let job = wf.job("unit-testing").unwrap();
        let strategy = job.strategy.as_ref().unwrap();
        assert!(!strategy.fail_fast);
        let matrix = strategy.matrix.as_ref().unwrap();
        assert_eq!(matrix.axes.len(), 1);
        assert_eq!(matrix.axes[0].0, "python-version");
        assert_eq!(matrix.axes[0].1.len(), 2);
    }

    #[test]
    fn test_on_string_shorthand() {
        let wf = Workflow::parse("on: push\njobs:\n  a:\n    steps: []\n").unwrap();
        assert!(wf.on.declares(EventKind::Push));
        assert_eq!(wf.on.entries.len(), 1);
    }

    #[test]
    fn test_on_list_shorthand() {
        let wf = Workflow::parse("on: [push, pull_request]\njobs:\n  a:\n    steps: []\n").unwrap();
        assert!(wf.on.declares(EventKind::Push));
        assert!(wf.on.declares(EventKind::PullRequest));
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result = Workflow::parse("on: release\njobs:\n  a:\n    steps: []\n");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse workflow YAML"));
    }

    #[test]
    fn test_no_jobs_rejected() {
        let result = Workflow::parse("on: push\njobs: {}\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no jobs"));
    }

    #[test]
    fn test_concurrency_string_shorthand() {
        let wf =
            Workflow::parse("on: push\nconcurrency: release\njobs:\n  a:\n    steps: []\n").unwrap();
        let c = wf.concurrency.unwrap();
        assert_eq!(c.group, "release");
        assert!(!c.cancel_in_progress);
    }

    #[test]
    fn test_env_scalars_stringified() {
        let wf = Workflow::parse(
            "on: push\nenv:\n  RETRIES: 3\n  VERBOSE: true\njobs:\n  a:\n    steps: []\n",
        )
        .unwrap();
        assert_eq!(wf.env.get("RETRIES").map(String::as_str), Some("3"));
        assert_eq!(wf.env.get("VERBOSE").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_step_display_name() {
        let step = Step {
            run: Some("make install\nmake test".to_string()),
            ..Default::default()
        };
        assert_eq!(step.display_name(0), "make install");

        let step = Step {
            uses: Some("actions/checkout@v4".to_string()),
            ..Default::default()
        };
        assert_eq!(step.display_name(2), "Run actions/checkout@v4");

        let step = Step::default();
        assert_eq!(step.display_name(2), "step 3");
    }

    #[test]
    fn test_is_cache_action() {
        let step = Step {
            uses: Some("cadence/cache@v1".to_string()),
            ..Default::default()
        };
        assert!(step.is_cache_action());

        let step = Step {
            uses: Some("actions/cache@v4".to_string()),
            ..Default::default()
        };
        assert!(step.is_cache_action());

        let step = Step {
            uses: Some("actions/checkout@v4".to_string()),
            ..Default::default()
        };
        assert!(!step.is_cache_action());
    }

    #[test]
    fn test_fail_fast_defaults_true() {
        let wf = Workflow::parse(
            "on: push\njobs:\n  a:\n    strategy:\n      matrix:\n        os: [linux]\n    steps: []\n",
        )
        .unwrap();
        let strategy = wf.job("a").unwrap().strategy.as_ref().unwrap();
        assert!(strategy.fail_fast);
    }
}
