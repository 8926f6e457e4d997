use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// TestHarness provides isolated test environments with a full cadence
/// project structure. Each harness creates a temporary directory with
/// `.cadence/` subdirectories and a default config, and runs the cadence
/// binary with the harness directory as its working directory.
pub struct TestHarness {
    pub dir: TempDir,
    pub workflows_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub binary: PathBuf,
}

impl TestHarness {
    /// Creates a fully initialized harness: workflows, runs, logs, cache,
    /// and locks directories plus a default config.yml.
    pub fn new() -> Self {
        let harness = Self::empty();
        let base = harness.dir.path();

        for sub in ["workflows", "runs", "logs", "cache", ".locks"] {
            fs::create_dir_all(base.join(".cadence").join(sub))
                .expect("Failed to create cadence dir");
        }
        let config = "defaults:\n  shell: sh\n  max_parallel: 4\nrunner:\n  labels: [local, self-hosted, ubuntu-latest]\n";
        fs::write(base.join(".cadence/config.yml"), config).expect("Failed to write config");

        harness
    }

    /// Creates a bare harness with no `.cadence/` directory, for init tests.
    #[allow(dead_code)]
    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();
        let workflows_dir = base.join(".cadence/workflows");
        let runs_dir = base.join(".cadence/runs");

        TestHarness {
            dir: temp_dir,
            workflows_dir,
            runs_dir,
            binary: PathBuf::from(env!("CARGO_BIN_EXE_cadence")),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes a workflow file into the workflows directory.
    pub fn create_workflow(&self, file_name: &str, content: &str) {
        fs::write(self.workflows_dir.join(file_name), content).expect("Failed to write workflow");
    }

    /// Executes the cadence binary with the given arguments in the harness
    /// directory.
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(&self.binary)
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("Failed to execute cadence")
    }

    /// Recorded run ids, newest first.
    #[allow(dead_code)]
    pub fn run_ids(&self) -> Vec<String> {
        cadence::runs::list_ids(&self.runs_dir).expect("Failed to list run ids")
    }

    /// Loads a run record by id.
    #[allow(dead_code)]
    pub fn run_record(&self, id: &str) -> cadence::runs::RunRecord {
        cadence::runs::RunRecord::load(&self.runs_dir, id).expect("Failed to load run record")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Stdout of a finished command, as UTF-8.
#[allow(dead_code)]
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Stderr of a finished command, as UTF-8.
#[allow(dead_code)]
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Combined stdout and stderr, for assertions that don't care which
/// stream a message went to.
#[allow(dead_code)]
pub fn all_output(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}
