//! CLI entry point for cadence.

mod cli;
mod cmd;

use anyhow::Result;
use clap::Parser;

use cli::{CacheCommands, Cli, Commands};

fn main() -> Result<()> {
    // Spawn the real work on a thread with a larger stack size.
    // Windows defaults to a 1MB stack which is insufficient in debug
    // builds; 8MB matches the Linux default.
    const STACK_SIZE: usize = 8 * 1024 * 1024;

    let thread = std::thread::Builder::new()
        .stack_size(STACK_SIZE)
        .spawn(run)
        .expect("failed to spawn main thread");

    match thread.join() {
        Ok(result) => result,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.quiet {
        std::env::set_var("CADENCE_QUIET", "1");
    }
    if !atty::is(atty::Stream::Stdout) {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Init { name, branch, force } => {
            cmd::init::cmd_init(name.as_deref(), &branch, force)
        }
        Commands::Validate { file, strict } => cmd::validate::cmd_validate(file.as_deref(), strict),
        Commands::List { json } => cmd::list::cmd_list(json),
        Commands::Run {
            workflow,
            event,
            git_ref,
            changed,
            job,
            dry_run,
        } => cmd::run::cmd_run(
            workflow.as_deref(),
            &event,
            &git_ref,
            &changed,
            job.as_deref(),
            dry_run,
        ),
        Commands::Status { run_id, limit } => cmd::status::cmd_status(run_id.as_deref(), limit),
        Commands::Logs { run_id, job } => cmd::logs::cmd_logs(&run_id, job.as_deref()),
        Commands::Cancel { run_id, wait } => cmd::cancel::cmd_cancel(&run_id, wait),
        Commands::Cache { command } => match command {
            CacheCommands::List => cmd::cache::cmd_cache_list(),
            CacheCommands::Clear => cmd::cache::cmd_cache_clear(),
        },
        Commands::Completion { shell } => cmd::util::cmd_completion(shell),
        Commands::Man { out_dir } => cmd::util::cmd_man(out_dir.as_ref()),
        Commands::Version { verbose } => cmd::util::cmd_version(verbose),
    }
}
