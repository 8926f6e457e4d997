//! CLI argument definitions.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(version)]
#[command(about = "Local CI workflow execution", long_about = None)]
#[command(after_help = "GETTING STARTED:\n    cadence init                Scaffold .cadence/ with a starter workflow\n    cadence validate            Check every workflow file\n    cadence run --event push    Run the workflows the event triggers")]
pub struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize cadence in the current directory
    Init {
        /// Project name used in the starter workflow (default: directory name)
        #[arg(long)]
        name: Option<String>,

        /// Default branch used in the starter workflow's filters
        #[arg(long, default_value = "main")]
        branch: String,

        /// Overwrite existing starter files without asking
        #[arg(long)]
        force: bool,
    },

    /// Validate workflow files
    Validate {
        /// Validate one file instead of every workflow
        file: Option<PathBuf>,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },

    /// List workflows and the events they trigger on
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the workflows an event triggers
    Run {
        /// Run only this workflow file (name or path)
        #[arg(long)]
        workflow: Option<PathBuf>,

        /// Event kind: push, pull_request, or workflow_dispatch
        #[arg(long, default_value = "push")]
        event: String,

        /// Branch or ref the event concerns
        #[arg(long = "ref", default_value = "main")]
        git_ref: String,

        /// Changed path for path filters (repeatable)
        #[arg(long = "changed", value_name = "PATH")]
        changed: Vec<String>,

        /// Run only this job and the jobs it needs
        #[arg(long)]
        job: Option<String>,

        /// Print the execution plan without running anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show recent runs, or details of one run
    Status {
        /// Run ID (full or partial); omit to list recent runs
        run_id: Option<String>,

        /// How many runs to list
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Print job logs for a run
    Logs {
        /// Run ID (full or partial)
        run_id: String,

        /// Only jobs whose name or id matches
        #[arg(long)]
        job: Option<String>,
    },

    /// Request cooperative cancellation of a run
    Cancel {
        /// Run ID (full or partial)
        run_id: String,

        /// Wait until the run has wound down
        #[arg(long)]
        wait: bool,
    },

    /// Manage the step cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },

    /// Generate shell completion script
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Generate man page
    #[command(hide = true)]
    Man {
        /// Output directory (default: current directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Show version information
    Version {
        /// Include build metadata
        #[arg(long)]
        verbose: bool,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// List cache entries, newest first
    List,

    /// Remove every cache entry
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::parse_from([
            "cadence", "run", "--event", "pull_request", "--ref", "develop", "--changed",
            "src/lib.rs", "--changed", "docs/a.md", "--dry-run",
        ]);
        match cli.command {
            Commands::Run {
                event,
                git_ref,
                changed,
                dry_run,
                ..
            } => {
                assert_eq!(event, "pull_request");
                assert_eq!(git_ref, "develop");
                assert_eq!(changed, vec!["src/lib.rs", "docs/a.md"]);
                assert!(dry_run);
            }
            _ => panic!("expected run"),
        }
    }
}
