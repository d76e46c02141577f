//! `agent-test`: run two-turn agent test suites and aggregate their reflections.

mod cli;
mod confirm;
mod render;
mod suite;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use harness::{exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "agent-test",
    version,
    about = "Run agent test suites with post-task reflection"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every test in a suite, then aggregate the results.
    Run {
        /// Suite definition (YAML).
        suite: PathBuf,
        /// Per-invocation timeout: 5m, 10m, none, or <n>s/<n>m. Prompts if omitted.
        #[arg(long)]
        timeout: Option<String>,
        /// Skip the confirmation prompt (and use the default timeout if none given).
        #[arg(short, long)]
        yes: bool,
        /// Number of tests to run concurrently.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
        jobs: u16,
        /// Harness config file (default: ./agent-test.toml if present).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check a suite definition without running anything.
    Validate {
        suite: PathBuf,
    },
    /// Write a default agent-test.toml in the current directory.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Re-aggregate the results in a run directory.
    Aggregate {
        results_dir: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            suite,
            timeout,
            yes,
            jobs,
            config,
        } => cli::run_suite_file(&cli::RunArgs {
            suite,
            timeout,
            yes,
            jobs: usize::from(jobs),
            config,
        }),
        Command::Validate { suite } => cli::validate_suite_file(&suite),
        Command::Init { force } => {
            let cwd = std::env::current_dir().context("resolve working directory")?;
            cli::init_config(&cwd, force)
        }
        Command::Aggregate {
            results_dir,
            config,
        } => cli::aggregate_dir(&results_dir, config.as_deref()),
    }
}
