//! Embedded templates for project scaffolding.
//!
//! `init` renders these into a fresh `.cadence/` directory. Workflow
//! expressions share Tera's `{{ }}` delimiters, so the workflow body is
//! wrapped in a raw block and only the header takes template variables.

use anyhow::{Context, Result};
use tera::Tera;

const STARTER_WORKFLOW: &str = r#"name: {{ project }}
on:
  push:
    branches: [{{ branch }}]
  pull_request:
    branches: [{{ branch }}]
  workflow_dispatch:
{% raw %}concurrency:
  group: ci-${{ event.ref }}
  cancel-in-progress: true
jobs:
  test:
    runs-on: local
    strategy:
      fail-fast: false
      matrix:
        profile: [debug, release]
    steps:
      - name: Show environment
        run: echo "profile=${{ matrix.profile }} ref=${{ event.ref }}"
      - name: Test
        run: echo "replace this with your test command"
  release-check:
    needs: test
    if: event.name == 'push'
    steps:
      - run: echo "ready to release"
{% endraw %}"#;

const STARTER_CONFIG: &str = r#"# Engine configuration. Project values override ~/.config/cadence/config.yml.
defaults:
  shell: {{ shell }}
  max_parallel: {{ max_parallel }}
runner:
  labels: [local, self-hosted, ubuntu-latest]
"#;

fn tera() -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_template("workflow.yml", STARTER_WORKFLOW)
        .context("Failed to load workflow template")?;
    tera.add_raw_template("config.yml", STARTER_CONFIG)
        .context("Failed to load config template")?;
    Ok(tera)
}

/// Render the starter workflow for a new project.
pub fn starter_workflow(project: &str, branch: &str) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("project", project);
    context.insert("branch", branch);
    tera()?
        .render("workflow.yml", &context)
        .context("Failed to render workflow template")
}

/// Render the starter project config.
pub fn starter_config(shell: &str, max_parallel: usize) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("shell", shell);
    context.insert("max_parallel", &max_parallel);
    tera()?
        .render("config.yml", &context)
        .context("Failed to render config template")
}
