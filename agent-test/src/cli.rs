//! CLI command implementations.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use harness::core::aggregate::aggregate;
use harness::core::budget::TimeoutPolicy;
use harness::core::depth::RecursionGuard;
use harness::core::reflection::ReflectionExtractor;
use harness::core::types::{AggregateSummary, SCHEMA_VERSION, TestResult, ThemeCategory};
use harness::exit_codes;
use harness::io::config::{HarnessConfig, default_config_path, resolve_config, write_config};
use harness::io::env::starting_depth_from_env;
use harness::io::invoker::ClaudeInvoker;
use harness::io::store::{
    ResultStore, RunMeta, StoreError, new_summary_document, run_stamp, timestamp,
};
use harness::runner::RunContext;
use harness::suite_run::{SuiteRunOptions, TestProgress, run_suite};

use crate::confirm::{confirm, describe_timeout, parse_timeout, select_timeout};
use crate::render::{describe_error, format_cost, format_duration, render_report};
use crate::suite::{LoadedSuite, SuiteFile, load_suite, suite_base_dir};

/// Number of improvement themes echoed to the console after a run.
const TOP_SUGGESTIONS: usize = 5;
const PROGRESS_WIDTH: usize = 40;

#[derive(Debug, Clone)]
pub struct RunArgs {
    pub suite: PathBuf,
    pub timeout: Option<String>,
    pub yes: bool,
    pub jobs: usize,
    pub config: Option<PathBuf>,
}

/// Run a suite end to end and return the process exit code.
pub fn run_suite_file(args: &RunArgs) -> Result<i32> {
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let config = resolve_config(args.config.as_deref(), &cwd)?;

    let guard = RecursionGuard::new(starting_depth_from_env());
    if let Err(err) = guard.check_entry() {
        eprintln!("error: {err}; refusing to start a nested run");
        return Ok(exit_codes::INVALID);
    }

    let suite = load_suite(&args.suite, config.default_max_turns)?;
    print_suite_info(&suite, &config, guard.starting_depth());

    let policy = match &args.timeout {
        Some(raw) => parse_timeout(raw)?,
        None if args.yes => TimeoutPolicy::default(),
        None => select_timeout(&mut io::stdin().lock(), &mut io::stdout())?,
    };
    println!("Timeout: {}", describe_timeout(policy));
    if !args.yes && !confirm(&mut io::stdin().lock(), &mut io::stdout(), "Proceed?")? {
        println!("Aborted.");
        return Ok(exit_codes::OK);
    }

    let extractor = ReflectionExtractor::new()?;
    let invoker = ClaudeInvoker::new(config.claude_binary.clone(), config.output_limit_bytes);
    let started = Utc::now();
    let results_root = suite.config.agent_dir.join(&config.results_dir_name);
    let store = match ResultStore::create(&results_root, &suite.config.name, &run_stamp(started)) {
        Ok(store) => store,
        Err(err) => return Ok(persistence_failure(&err)),
    };
    let jobs = args.jobs.max(1);
    let meta = RunMeta {
        schema_version: SCHEMA_VERSION.to_string(),
        suite_name: suite.config.name.clone(),
        suite_sha256: suite.sha256.clone(),
        run_stamp: run_stamp(started),
        started_at: timestamp(started),
        depth: guard.starting_depth(),
        timeout_seconds: policy.as_secs(),
        test_count: suite.tests.len(),
        jobs,
    };
    if let Err(err) = store.write_run_meta(&meta) {
        return Ok(persistence_failure(&err));
    }
    info!(dir = %store.dir().display(), jobs, "starting run");

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    if let Err(err) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        warn!(err = %err, "could not install Ctrl-C handler");
    }

    println!();
    let ctx = RunContext {
        suite: &suite.config,
        guard: &guard,
        invoker: &invoker,
        policy,
        extractor: &extractor,
    };
    let outcome = match run_suite(
        &suite.tests,
        &ctx,
        &store,
        SuiteRunOptions {
            jobs,
            cancel: &cancel,
        },
        |progress| println!("{}", progress_line(&progress)),
    ) {
        Ok(outcome) => outcome,
        Err(err) => match err.downcast_ref::<StoreError>() {
            Some(store_err) => return Ok(persistence_failure(store_err)),
            None => return Err(err),
        },
    };

    if outcome.interrupted {
        println!(
            "\nInterrupted: {} of {} tests persisted; {} not run.",
            outcome.results.len(),
            suite.tests.len(),
            outcome.not_run.len()
        );
    }

    let summary = aggregate(&outcome.results, &config.theme_options());
    if let Err(err) = write_artifacts(&store, &suite.config.name, &summary, Vec::new()) {
        return Ok(persistence_failure(&err));
    }
    print_summary(&summary, &outcome.results, store.dir());

    Ok(if outcome.interrupted {
        exit_codes::INTERRUPTED
    } else if summary.failed > 0 {
        exit_codes::TESTS_FAILED
    } else {
        exit_codes::OK
    })
}

/// Check a suite without invoking anything.
pub fn validate_suite_file(path: &Path) -> Result<i32> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            println!("✗ read {}: {err}", path.display());
            return Ok(exit_codes::INVALID);
        }
    };
    let suite = match SuiteFile::parse_str(&contents) {
        Ok(suite) => suite,
        Err(err) => {
            println!("✗ {err:#}");
            return Ok(exit_codes::INVALID);
        }
    };
    println!("✓ parsed {}", path.display());

    let base_dir = suite_base_dir(path);
    let problems = suite.problems(&base_dir);
    if !problems.is_empty() {
        for problem in &problems {
            println!("✗ {problem}");
        }
        println!("\n{} problem(s) found", problems.len());
        return Ok(exit_codes::INVALID);
    }

    println!("✓ name: {}", suite.name.as_deref().unwrap_or_default());
    if let Some(dir) = suite.resolved_agent_dir(&base_dir) {
        println!("✓ agent_dir: {}", dir.display());
    }
    println!("✓ {} tests, ids unique", suite.tests.len());
    if let Some(max_turns) = suite.max_turns {
        println!("✓ max_turns: {max_turns}");
    }
    println!("\nSuite is valid.");
    Ok(exit_codes::OK)
}

/// Re-aggregate a run directory; partial runs are fine.
pub fn aggregate_dir(dir: &Path, config_path: Option<&Path>) -> Result<i32> {
    let cwd = std::env::current_dir().context("resolve working directory")?;
    let config = resolve_config(config_path, &cwd)?;
    let store = ResultStore::open(dir)?;
    let loaded = store.load_results()?;
    for warning in &loaded.warnings {
        eprintln!("warning: {warning}");
    }
    if loaded.results.is_empty() {
        eprintln!("warning: no test results found in {}", dir.display());
    }
    println!("Found {} test result(s)", loaded.results.len());

    let suite_name = store
        .load_run_meta()
        .map(|meta| meta.suite_name)
        .unwrap_or_else(|| suite_name_from_dir(dir));
    let summary = aggregate(&loaded.results, &config.theme_options());
    if let Err(err) = write_artifacts(&store, &suite_name, &summary, loaded.warnings) {
        return Ok(persistence_failure(&err));
    }
    print_summary(&summary, &loaded.results, store.dir());
    Ok(exit_codes::OK)
}

/// Write a default `agent-test.toml` into `dir`.
pub fn init_config(dir: &Path, force: bool) -> Result<i32> {
    let path = default_config_path(dir);
    if path.exists() && !force {
        eprintln!("error: {} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::INVALID);
    }
    write_config(&path, &HarnessConfig::default())?;
    println!("Wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn write_artifacts(
    store: &ResultStore,
    suite_name: &str,
    summary: &AggregateSummary,
    warnings: Vec<String>,
) -> std::result::Result<(), StoreError> {
    let document = new_summary_document(suite_name, store.dir(), summary.clone(), warnings);
    let summary_path = store.write_summary(&document)?;
    debug!(path = %summary_path.display(), "wrote summary");
    match render_report(&document) {
        Ok(report) => {
            store.write_report(&report)?;
        }
        Err(err) => warn!(err = %format!("{err:#}"), "could not render report"),
    }
    Ok(())
}

fn persistence_failure(err: &StoreError) -> i32 {
    eprintln!("fatal: results could not be persisted: {err}");
    exit_codes::PERSISTENCE
}

/// The run directory's parent is named after the suite.
fn suite_name_from_dir(dir: &Path) -> String {
    dir.parent()
        .and_then(Path::file_name)
        .map_or_else(|| "unknown".to_string(), |name| name.to_string_lossy().to_string())
}

fn print_suite_info(suite: &LoadedSuite, config: &HarnessConfig, depth: u32) {
    let count = suite.tests.len();
    println!("Suite: {} ({})", suite.config.name, suite.path.display());
    if !suite.config.description.is_empty() {
        println!("  {}", suite.config.description);
    }
    println!("Agent dir: {}", suite.config.agent_dir.display());
    println!("Tests: {count}");
    println!("Max turns: {}", suite.config.max_turns);
    if depth > 0 {
        println!("Nested run at depth {depth}");
    }
    println!(
        "Estimated cost: ~{} ({count} tests x {})",
        format_cost(count as f64 * config.cost_per_test_estimate),
        format_cost(config.cost_per_test_estimate)
    );
}

/// `[2/5] count-books ........ PASS ($0.05, 12s)`
pub fn progress_line(progress: &TestProgress<'_>) -> String {
    let result = progress.result;
    let status = if result.success { "PASS" } else { "FAIL" };
    let dots = ".".repeat(PROGRESS_WIDTH.saturating_sub(result.test_id.len()).max(3));
    let mut line = format!(
        "[{}/{}] {} {dots} {status} ({}, {})",
        progress.position,
        progress.total,
        result.test_id,
        format_cost(result.total_cost_usd),
        format_duration(result.duration_seconds)
    );
    if let Some(error) = &result.error {
        line.push_str(&format!(" {}", error.kind.as_str()));
    }
    line
}

fn print_summary(summary: &AggregateSummary, results: &[TestResult], dir: &Path) {
    println!("\n{}", "=".repeat(60));
    println!("Summary: {}/{} passed", summary.passed, summary.total);
    println!("Total cost: {}", format_cost(summary.total_cost_usd));
    println!(
        "Total duration: {}",
        format_duration(summary.total_duration_seconds)
    );

    if !summary.failed_test_details.is_empty() {
        println!("\nFailed tests:");
        for detail in &summary.failed_test_details {
            println!("  - {}: {}", detail.test_id, describe_error(detail.error.as_ref()));
            println!("    prompt: {}", first_line(&detail.prompt));
        }
    }

    let suggestions: Vec<_> = summary
        .themes
        .iter()
        .filter(|theme| theme.category == ThemeCategory::ImprovementSuggestions)
        .collect();
    if !suggestions.is_empty() {
        println!("\nTop improvement suggestions:");
        for theme in suggestions.iter().take(TOP_SUGGESTIONS) {
            println!("  - {} ({}x)", theme.label, theme.frequency);
        }
        if suggestions.len() > TOP_SUGGESTIONS {
            println!("  ... and {} more", suggestions.len() - TOP_SUGGESTIONS);
        }
    }

    let unstructured = results
        .iter()
        .filter_map(|result| result.turn2_reflection.as_ref())
        .filter(|reflection| !reflection.is_structured)
        .count();
    if unstructured > 0 {
        println!("\n{unstructured} reflection(s) were recovered heuristically from prose.");
    }
    println!("\nResults: {}", dir.display());
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default().trim()
}
