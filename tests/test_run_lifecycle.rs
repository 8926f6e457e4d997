//! Integration tests for `cadence run`, `status`, `logs`, and `cancel`.

mod support;
use cadence::runs::Conclusion;
use support::harness::{all_output, stdout, TestHarness};

const CI: &str = r#"name: ci
on:
  push:
    branches: [main]
jobs:
  build:
    steps:
      - name: Greet
        run: echo hello-from-cadence
"#;

#[test]
fn test_run_records_a_successful_run() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", CI);

    let output = harness.run(&["run", "--event", "push", "--ref", "main"]);
    assert!(output.status.success(), "{}", all_output(&output));

    let ids = harness.run_ids();
    assert_eq!(ids.len(), 1);
    let record = harness.run_record(&ids[0]);
    assert_eq!(record.conclusion, Some(Conclusion::Success));
    assert_eq!(record.event, "push");
    assert_eq!(record.git_ref, "main");
}

#[test]
fn test_run_failure_exits_nonzero() {
    let harness = TestHarness::new();
    harness.create_workflow(
        "ci.yml",
        "on: push\njobs:\n  build:\n    steps:\n      - run: exit 3\n",
    );

    let output = harness.run(&["run", "--event", "push"]);
    assert!(!output.status.success());

    let ids = harness.run_ids();
    let record = harness.run_record(&ids[0]);
    assert_eq!(record.conclusion, Some(Conclusion::Failure));
    assert_eq!(record.jobs[0].steps[0].exit_code, Some(3));
}

#[test]
fn test_run_skips_untriggered_workflow() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", CI);

    let output = harness.run(&["run", "--event", "push", "--ref", "develop"]);
    assert!(output.status.success(), "{}", all_output(&output));
    assert!(stdout(&output).contains("No workflows triggered"));
    assert!(harness.run_ids().is_empty());
}

#[test]
fn test_run_changed_paths_filter() {
    let harness = TestHarness::new();
    harness.create_workflow(
        "ci.yml",
        "on:\n  push:\n    paths: [\"src/**\"]\njobs:\n  build:\n    steps:\n      - run: echo ok\n",
    );

    let miss = harness.run(&["run", "--event", "push", "--changed", "docs/readme.md"]);
    assert!(miss.status.success());
    assert!(harness.run_ids().is_empty());

    let hit = harness.run(&["run", "--event", "push", "--changed", "src/lib.rs"]);
    assert!(hit.status.success(), "{}", all_output(&hit));
    assert_eq!(harness.run_ids().len(), 1);
}

#[test]
fn test_dry_run_prints_plan_without_running() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", CI);

    let output = harness.run(&["run", "--event", "push", "--dry-run"]);
    assert!(output.status.success(), "{}", all_output(&output));
    assert!(stdout(&output).contains("build"));
    assert!(harness.run_ids().is_empty());
}

#[test]
fn test_run_refuses_invalid_workflow() {
    let harness = TestHarness::new();
    harness.create_workflow(
        "ci.yml",
        "on: push\njobs:\n  test:\n    needs: missing\n    steps:\n      - run: echo hi\n",
    );

    let output = harness.run(&["run", "--event", "push"]);
    assert!(!output.status.success());
    assert!(harness.run_ids().is_empty());
}

#[test]
fn test_job_filter_restricts_the_run() {
    let harness = TestHarness::new();
    harness.create_workflow(
        "ci.yml",
        "on: push\njobs:\n  build:\n    steps:\n      - run: echo build\n  docs:\n    steps:\n      - run: echo docs\n",
    );

    let output = harness.run(&["run", "--event", "push", "--job", "build"]);
    assert!(output.status.success(), "{}", all_output(&output));

    let record = harness.run_record(&harness.run_ids()[0]);
    let job_ids: Vec<&str> = record.jobs.iter().map(|j| j.job_id.as_str()).collect();
    assert_eq!(job_ids, vec!["build"]);
}

#[test]
fn test_status_lists_runs_and_shows_detail() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", CI);
    harness.run(&["run", "--event", "push"]);

    let id = harness.run_ids()[0].clone();

    let listing = harness.run(&["status"]);
    assert!(listing.status.success());
    assert!(stdout(&listing).contains(&id));

    let detail = harness.run(&["status", &id]);
    assert!(detail.status.success());
    assert!(stdout(&detail).contains("Greet"));
}

#[test]
fn test_status_resolves_partial_run_id() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", CI);
    harness.run(&["run", "--event", "push"]);

    let id = harness.run_ids()[0].clone();
    let suffix = &id[id.len() - 3..];

    let detail = harness.run(&["status", suffix]);
    assert!(detail.status.success(), "{}", all_output(&detail));
    assert!(stdout(&detail).contains(&id));
}

#[test]
fn test_logs_show_step_output() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", CI);
    harness.run(&["run", "--event", "push"]);

    let id = harness.run_ids()[0].clone();
    let output = harness.run(&["logs", &id]);
    assert!(output.status.success(), "{}", all_output(&output));
    assert!(stdout(&output).contains("hello-from-cadence"));
}

#[test]
fn test_cancel_of_completed_run_is_a_no_op() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", CI);
    harness.run(&["run", "--event", "push"]);

    let id = harness.run_ids()[0].clone();
    let output = harness.run(&["cancel", &id]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("already completed"));
}

#[test]
fn test_workflow_dispatch_ignores_filters() {
    let harness = TestHarness::new();
    harness.create_workflow(
        "ci.yml",
        "on:\n  workflow_dispatch:\n  push:\n    branches: [main]\njobs:\n  build:\n    steps:\n      - run: echo ok\n",
    );

    let output = harness.run(&["run", "--event", "workflow_dispatch", "--ref", "anything"]);
    assert!(output.status.success(), "{}", all_output(&output));
    assert_eq!(harness.run_ids().len(), 1);
}
