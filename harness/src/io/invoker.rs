//! Agent invocation backends.
//!
//! The [`TurnInvoker`] trait decouples the test runner from the agent CLI.
//! Tests use scripted invokers that return predetermined outcomes without
//! spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::types::TurnOutcome;
use crate::io::env::DEPTH_ENV_VAR;
use crate::io::process::run_command_with_timeout;

/// Parameters for one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub prompt: String,
    pub working_dir: PathBuf,
    /// Resume this conversation instead of starting a new one.
    pub session_id: Option<String>,
    /// Maximum agent turns this invocation may consume.
    pub turn_budget: u32,
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    pub allowed_tools: Option<String>,
    pub permission_mode: Option<String>,
    /// Recursion depth the invoked agent runs at.
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvokeError {
    #[error("timed out after {}s", .after.as_secs())]
    Timeout {
        after: Duration,
        /// Spend before the process was stopped, when the backend can tell.
        partial_cost_usd: Option<f64>,
    },
    #[error("turn budget exhausted after {} turns", .outcome.num_turns)]
    BudgetExhausted { outcome: TurnOutcome },
    #[error("{message}")]
    Invocation {
        message: String,
        partial_cost_usd: Option<f64>,
    },
}

impl InvokeError {
    /// Spend attributable to the failed invocation.
    pub fn partial_cost_usd(&self) -> f64 {
        match self {
            InvokeError::Timeout {
                partial_cost_usd, ..
            }
            | InvokeError::Invocation {
                partial_cost_usd, ..
            } => partial_cost_usd.unwrap_or(0.0),
            InvokeError::BudgetExhausted { outcome } => outcome.cost_usd,
        }
    }
}

/// Abstraction over agent backends. Shared by worker threads.
pub trait TurnInvoker: Sync {
    fn invoke(&self, request: &TurnRequest) -> Result<TurnOutcome, InvokeError>;
}

/// Invoker that spawns the `claude` CLI in print mode.
#[derive(Debug, Clone)]
pub struct ClaudeInvoker {
    binary: String,
    output_limit_bytes: usize,
}

impl ClaudeInvoker {
    pub fn new(binary: impl Into<String>, output_limit_bytes: usize) -> Self {
        Self {
            binary: binary.into(),
            output_limit_bytes,
        }
    }

    fn command(&self, request: &TurnRequest) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p")
            .arg(&request.prompt)
            .arg("--output-format")
            .arg("json");
        if let Some(session_id) = &request.session_id {
            cmd.arg("--resume").arg(session_id);
        }
        if let Some(tools) = &request.allowed_tools {
            cmd.arg("--allowedTools").arg(tools);
        }
        if let Some(mode) = &request.permission_mode {
            cmd.arg("--permission-mode").arg(mode);
        }
        cmd.arg("--max-turns")
            .arg(request.turn_budget.to_string())
            .current_dir(&request.working_dir)
            .env(DEPTH_ENV_VAR, request.depth.to_string());
        cmd
    }
}

impl TurnInvoker for ClaudeInvoker {
    #[instrument(skip_all, fields(resume = request.session_id.is_some(), turn_budget = request.turn_budget, depth = request.depth))]
    fn invoke(&self, request: &TurnRequest) -> Result<TurnOutcome, InvokeError> {
        info!(workdir = %request.working_dir.display(), "invoking agent");
        let output = run_command_with_timeout(
            self.command(request),
            request.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| InvokeError::Invocation {
            message: format!("{} could not be run: {err:#}", self.binary),
            partial_cost_usd: None,
        })?;

        if output.timed_out {
            let after = request.timeout.unwrap_or_default();
            warn!(timeout_secs = after.as_secs(), "agent invocation timed out");
            return Err(InvokeError::Timeout {
                after,
                partial_cost_usd: None,
            });
        }
        parse_cli_output(
            &output.stdout,
            output.status.success(),
            &output.stderr_lossy(),
        )
    }
}

/// Interpret the JSON document printed by `claude --output-format json`.
///
/// Keys are read leniently since the CLI has renamed several over time.
pub fn parse_cli_output(
    stdout: &[u8],
    exit_success: bool,
    stderr: &str,
) -> Result<TurnOutcome, InvokeError> {
    let value: Value = match serde_json::from_slice(stdout) {
        Ok(value) => value,
        Err(err) => {
            let detail = if stderr.is_empty() {
                err.to_string()
            } else {
                stderr.to_string()
            };
            return Err(InvokeError::Invocation {
                message: format!("failed to parse agent output as JSON: {detail}"),
                partial_cost_usd: None,
            });
        }
    };

    let text = match first_key(&value, &["result", "message"]) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let session_id = first_key(&value, &["session_id", "sessionId"])
        .and_then(Value::as_str)
        .map(str::to_string);
    let cost = first_key(&value, &["total_cost_usd", "cost_usd", "costUsd"])
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let num_turns = first_key(&value, &["num_turns", "numTurns"])
        .and_then(Value::as_u64)
        .map_or(1, |turns| u32::try_from(turns).unwrap_or(u32::MAX));
    let subtype = value
        .get("subtype")
        .and_then(Value::as_str)
        .unwrap_or("success");
    let outcome = TurnOutcome::new(text, session_id, cost, num_turns);
    debug!(subtype, num_turns, cost_usd = outcome.cost_usd, "parsed agent output");

    if subtype == "error_max_turns" {
        return Err(InvokeError::BudgetExhausted { outcome });
    }
    let is_error = value
        .get("is_error")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !exit_success || is_error || subtype.starts_with("error") {
        let message = if stderr.is_empty() {
            format!("agent reported {subtype}")
        } else {
            stderr.to_string()
        };
        return Err(InvokeError::Invocation {
            message,
            partial_cost_usd: Some(outcome.cost_usd),
        });
    }
    Ok(outcome)
}

fn first_key<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    keys.iter().find_map(|key| value.get(*key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_document() {
        let stdout = br#"{"type":"result","subtype":"success","result":"42 items","session_id":"abc","total_cost_usd":0.031,"num_turns":4}"#;
        let outcome = parse_cli_output(stdout, true, "").expect("outcome");
        assert_eq!(outcome.text, "42 items");
        assert_eq!(outcome.session_id.as_deref(), Some("abc"));
        assert!((outcome.cost_usd - 0.031).abs() < 1e-9);
        assert_eq!(outcome.num_turns, 4);
    }

    #[test]
    fn accepts_alternate_key_names() {
        let stdout = br#"{"message":{"k":1},"sessionId":"s","costUsd":0.5}"#;
        let outcome = parse_cli_output(stdout, true, "").expect("outcome");
        assert_eq!(outcome.text, r#"{"k":1}"#);
        assert_eq!(outcome.session_id.as_deref(), Some("s"));
        assert_eq!(outcome.num_turns, 1);
    }

    #[test]
    fn max_turns_is_budget_exhausted() {
        let stdout = br#"{"subtype":"error_max_turns","session_id":"s","total_cost_usd":0.2,"num_turns":10}"#;
        let err = parse_cli_output(stdout, true, "").expect_err("exhausted");
        match err {
            InvokeError::BudgetExhausted { outcome } => {
                assert_eq!(outcome.num_turns, 10);
                assert!((outcome.cost_usd - 0.2).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn non_json_is_an_invocation_error() {
        let err = parse_cli_output(b"not json", true, "boom").expect_err("invalid");
        assert!(matches!(err, InvokeError::Invocation { .. }));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn failed_exit_keeps_reported_cost() {
        let stdout = br#"{"result":"","total_cost_usd":0.4}"#;
        let err = parse_cli_output(stdout, false, "rate limited").expect_err("failed");
        assert_eq!(err.partial_cost_usd(), 0.4);
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn command_carries_session_budget_and_depth() {
        let invoker = ClaudeInvoker::new("claude", 1024);
        let request = TurnRequest {
            prompt: "reflect".to_string(),
            working_dir: PathBuf::from("/tmp"),
            session_id: Some("abc".to_string()),
            turn_budget: 7,
            timeout: None,
            allowed_tools: Some("Read,Grep".to_string()),
            permission_mode: None,
            depth: 1,
        };
        let cmd = invoker.command(&request);
        let args: Vec<_> = cmd
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "-p",
                "reflect",
                "--output-format",
                "json",
                "--resume",
                "abc",
                "--allowedTools",
                "Read,Grep",
                "--max-turns",
                "7"
            ]
        );
        let depth = cmd
            .get_envs()
            .find(|(key, _)| *key == DEPTH_ENV_VAR)
            .and_then(|(_, value)| value)
            .map(|value| value.to_string_lossy().into_owned());
        assert_eq!(depth.as_deref(), Some("1"));
    }

    #[cfg(unix)]
    #[test]
    fn missing_binary_is_an_invocation_error() {
        let invoker = ClaudeInvoker::new("/nonexistent/agent-cli", 1024);
        let request = TurnRequest {
            prompt: "hi".to_string(),
            working_dir: std::env::temp_dir(),
            session_id: None,
            turn_budget: 1,
            timeout: Some(Duration::from_secs(5)),
            allowed_tools: None,
            permission_mode: None,
            depth: 1,
        };
        let err = invoker.invoke(&request).expect_err("spawn fails");
        assert!(matches!(err, InvokeError::Invocation { .. }));
    }
}
