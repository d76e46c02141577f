//! CLI tests for the `agent-test` binary.
//!
//! Spawns the binary and checks exit codes plus the files it leaves behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use harness::core::types::{ReflectionData, TestResult};
use harness::exit_codes;
use harness::io::env::DEPTH_ENV_VAR;
use harness::io::store::{REPORT_FILE, ResultStore, SUMMARY_FILE};

fn agent_test(cwd: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_agent-test"))
        .current_dir(cwd)
        .env_remove(DEPTH_ENV_VAR)
        .args(args)
        .output()
        .expect("spawn agent-test")
}

fn write_suite(dir: &Path, body: &str) -> PathBuf {
    fs::create_dir_all(dir.join("agent")).expect("agent dir");
    let path = dir.join("suite.yaml");
    fs::write(&path, body).expect("write suite");
    path
}

const VALID_SUITE: &str = "\
name: bookstore
agent_dir: agent
max_turns: 5
tests:
  - id: count-books
    prompt: How many books are in stock?
  - id: recent-orders
    prompt: List this week's orders.
";

#[test]
fn validate_accepts_well_formed_suite() {
    let temp = tempfile::tempdir().expect("tempdir");
    let suite = write_suite(temp.path(), VALID_SUITE);

    let output = agent_test(temp.path(), &["validate", suite.to_str().expect("utf8")]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{stdout}");
    assert!(stdout.contains("✓ 2 tests, ids unique"));
    assert!(stdout.contains("Suite is valid."));
}

#[test]
fn validate_lists_every_problem() {
    let temp = tempfile::tempdir().expect("tempdir");
    let suite = write_suite(
        temp.path(),
        "\
name: bookstore
agent_dir: missing
tests:
  - id: a
    prompt: one
  - id: a
    prompt: ''
",
    );

    let output = agent_test(temp.path(), &["validate", suite.to_str().expect("utf8")]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID), "{stdout}");
    assert!(stdout.contains("does not exist"));
    assert!(stdout.contains("duplicate id"));
    assert!(stdout.contains("prompt must be non-empty"));
}

#[test]
fn run_refuses_beyond_depth_ceiling() {
    let temp = tempfile::tempdir().expect("tempdir");
    let suite = write_suite(temp.path(), VALID_SUITE);

    let output = Command::new(env!("CARGO_BIN_EXE_agent-test"))
        .current_dir(temp.path())
        .env(DEPTH_ENV_VAR, "3")
        .args(["run", suite.to_str().expect("utf8"), "--yes"])
        .output()
        .expect("spawn agent-test");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("recursion depth"));
    assert!(!temp.path().join("agent/.agent-test-results").exists());
}

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = agent_test(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let written = fs::read_to_string(temp.path().join("agent-test.toml")).expect("config");
    assert!(written.contains("claude_binary = \"claude\""));

    let output = agent_test(temp.path(), &["init"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let output = agent_test(temp.path(), &["init", "--force"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
}

#[test]
fn aggregate_writes_summary_and_report() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = ResultStore::create(&temp.path().join("results"), "bookstore", "20260101_000000")
        .expect("store");
    let reflection = ReflectionData {
        improvement_suggestions: vec!["Add date filtering examples".to_string()],
        is_structured: true,
        ..ReflectionData::default()
    };
    for (id, success) in [("a", true), ("b", false)] {
        store
            .persist(&TestResult {
                test_id: id.to_string(),
                prompt: format!("prompt {id}"),
                success,
                total_cost_usd: 0.05,
                duration_seconds: 10.0,
                turn2_reflection: success.then(|| reflection.clone()),
                ..TestResult::default()
            })
            .expect("persist");
    }

    let output = agent_test(
        temp.path(),
        &["aggregate", store.dir().to_str().expect("utf8")],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{stdout}");
    assert!(stdout.contains("Summary: 1/2 passed"));

    let summary: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(store.dir().join(SUMMARY_FILE)).expect("summary"),
    )
    .expect("summary json");
    assert_eq!(summary["suite_name"], "bookstore");
    assert_eq!(summary["summary"]["total"], 2);
    assert_eq!(summary["summary"]["failed"], 1);

    let report = fs::read_to_string(store.dir().join(REPORT_FILE)).expect("report");
    assert!(report.starts_with("# Test Suite Results: bookstore"));
    assert!(report.contains("Add date filtering examples"));
}

/// End to end against a stand-in agent that always answers the same JSON.
#[cfg(unix)]
#[test]
fn run_with_stub_agent_persists_results_and_artifacts() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempfile::tempdir().expect("tempdir");
    let suite = write_suite(temp.path(), VALID_SUITE);
    let agent = temp.path().join("fake-agent.sh");
    fs::write(
        &agent,
        "#!/bin/sh\n\
         echo '{\"type\":\"result\",\"subtype\":\"success\",\"is_error\":false,\
         \"result\":\"Improvement: add an index on orders\",\"session_id\":\"s1\",\
         \"total_cost_usd\":0.01,\"num_turns\":1}'\n",
    )
    .expect("write agent");
    fs::set_permissions(&agent, fs::Permissions::from_mode(0o755)).expect("chmod");
    let config = temp.path().join("agent-test.toml");
    fs::write(
        &config,
        format!("claude_binary = {:?}\n", agent.to_str().expect("utf8")),
    )
    .expect("write config");

    let output = agent_test(
        temp.path(),
        &[
            "run",
            suite.to_str().expect("utf8"),
            "--yes",
            "--timeout",
            "30s",
            "--jobs",
            "2",
        ],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "{stdout}\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("Summary: 2/2 passed"));

    let runs: Vec<_> = fs::read_dir(temp.path().join("agent/.agent-test-results/bookstore"))
        .expect("runs")
        .map(|entry| entry.expect("entry").path())
        .collect();
    assert_eq!(runs.len(), 1);
    let run_dir = &runs[0];
    for file in ["count-books.json", "recent-orders.json", SUMMARY_FILE, REPORT_FILE] {
        assert!(run_dir.join(file).exists(), "missing {file}");
    }
    let result: TestResult = serde_json::from_str(
        &fs::read_to_string(run_dir.join("count-books.json")).expect("result"),
    )
    .expect("result json");
    assert!(result.success);
    assert!((result.total_cost_usd - 0.02).abs() < 1e-9);
    assert!(result.turn2.is_some());
}
