//! Integration tests for `cadence init` and `cadence list`.

mod support;
use support::harness::{all_output, stdout, TestHarness};

#[test]
fn test_init_scaffolds_project() {
    let harness = TestHarness::empty();

    let output = harness.run(&["init", "--name", "demo"]);
    assert!(output.status.success(), "{}", all_output(&output));

    assert!(harness.path().join(".cadence/config.yml").exists());
    assert!(harness.path().join(".cadence/workflows/ci.yml").exists());
    assert!(harness.path().join(".cadence/runs").exists());
    assert!(harness.path().join(".cadence/cache").exists());
}

#[test]
fn test_init_starter_workflow_validates() {
    let harness = TestHarness::empty();
    harness.run(&["init", "--name", "demo"]);

    let output = harness.run(&["validate"]);
    assert!(output.status.success(), "{}", all_output(&output));
}

#[test]
fn test_init_refuses_reinit_without_force() {
    let harness = TestHarness::empty();
    harness.run(&["init", "--name", "demo"]);

    // stdin is not a terminal here, so there is no confirmation prompt.
    let output = harness.run(&["init", "--name", "other"]);
    assert!(!output.status.success());
    assert!(all_output(&output).contains("--force"));
}

#[test]
fn test_init_force_overwrites() {
    let harness = TestHarness::empty();
    harness.run(&["init", "--name", "demo"]);

    let output = harness.run(&["init", "--name", "other", "--force"]);
    assert!(output.status.success(), "{}", all_output(&output));

    let content =
        std::fs::read_to_string(harness.path().join(".cadence/workflows/ci.yml")).unwrap();
    assert!(content.contains("name: other"));
}

#[test]
fn test_list_shows_workflows() {
    let harness = TestHarness::empty();
    harness.run(&["init", "--name", "demo"]);

    let output = harness.run(&["list"]);
    assert!(output.status.success(), "{}", all_output(&output));
    assert!(stdout(&output).contains("demo"));
    assert!(stdout(&output).contains("push"));
}

#[test]
fn test_list_json_output() {
    let harness = TestHarness::empty();
    harness.run(&["init", "--name", "demo"]);

    let output = harness.run(&["list", "--json"]);
    assert!(output.status.success(), "{}", all_output(&output));

    let parsed: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let items = parsed.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "demo");
    assert!(items[0]["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .any(|j| j == "test"));
}
