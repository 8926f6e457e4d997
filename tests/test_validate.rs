//! Integration tests for `cadence validate`.

mod support;
use support::harness::{all_output, stdout, TestHarness};

const GOOD: &str = "on: push\njobs:\n  build:\n    steps:\n      - run: echo ok\n";

#[test]
fn test_validate_passes_for_valid_workflow() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", GOOD);

    let output = harness.run(&["validate"]);
    assert!(output.status.success(), "{}", all_output(&output));
    assert!(stdout(&output).contains("valid"));
}

#[test]
fn test_validate_fails_for_step_with_run_and_uses() {
    let harness = TestHarness::new();
    harness.create_workflow(
        "ci.yml",
        "on: push\njobs:\n  build:\n    steps:\n      - run: echo hi\n        uses: actions/cache@v4\n",
    );

    let output = harness.run(&["validate"]);
    assert!(!output.status.success());
}

#[test]
fn test_validate_fails_for_invalid_yaml() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", "on: [push\njobs:\n");

    let output = harness.run(&["validate"]);
    assert!(!output.status.success());
}

#[test]
fn test_validate_fails_for_unknown_dependency() {
    let harness = TestHarness::new();
    harness.create_workflow(
        "ci.yml",
        "on: push\njobs:\n  test:\n    needs: build\n    steps:\n      - run: echo hi\n",
    );

    let output = harness.run(&["validate"]);
    assert!(!output.status.success());
}

#[test]
fn test_validate_strict_turns_warnings_into_failures() {
    let harness = TestHarness::new();
    // A mutable action ref is a warning, not an error.
    harness.create_workflow(
        "ci.yml",
        "on: push\njobs:\n  build:\n    steps:\n      - uses: actions/checkout@main\n",
    );

    let lenient = harness.run(&["validate"]);
    assert!(lenient.status.success(), "{}", all_output(&lenient));

    let strict = harness.run(&["validate", "--strict"]);
    assert!(!strict.status.success());
}

#[test]
fn test_validate_single_file_argument() {
    let harness = TestHarness::new();
    harness.create_workflow("ci.yml", GOOD);
    harness.create_workflow("broken.yml", "on: [push\n");

    let output = harness.run(&["validate", ".cadence/workflows/ci.yml"]);
    assert!(output.status.success(), "{}", all_output(&output));
}

#[test]
fn test_validate_missing_file() {
    let harness = TestHarness::new();

    let output = harness.run(&["validate", "no-such-file.yml"]);
    assert!(!output.status.success());
}

#[test]
fn test_validate_requires_initialization() {
    let harness = TestHarness::empty();

    let output = harness.run(&["validate"]);
    assert!(!output.status.success());
    assert!(all_output(&output).contains("not initialized"));
}
