//! Shared records for test execution and aggregation.
//!
//! Everything persisted to disk lives here. Fields that may be missing from
//! older or partially written documents deserialize with defaults so that
//! loading never depends on a complete record.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Version tag written into every persisted document.
pub const SCHEMA_VERSION: &str = "1.0";

/// One unit of work in a suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique within the suite; doubles as the result file stem.
    pub id: String,
    /// Text sent to the agent on turn 1.
    pub prompt: String,
    /// Documentation only. Never evaluated.
    #[serde(default)]
    pub expected_behavior: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Suite-wide settings shared by every test in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Working directory handed to every invocation.
    pub agent_dir: PathBuf,
    /// Turn budget shared by turn 1 and turn 2.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default)]
    pub allowed_tools: Option<String>,
    #[serde(default)]
    pub permission_mode: Option<String>,
}

pub const DEFAULT_MAX_TURNS: u32 = 10;

fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

/// Result of one invocation of the agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnOutcome {
    pub text: String,
    /// Opaque continuation token used to resume the conversation.
    pub session_id: Option<String>,
    pub cost_usd: f64,
    /// Agent turns consumed by this invocation.
    pub num_turns: u32,
}

impl TurnOutcome {
    pub fn new(
        text: impl Into<String>,
        session_id: Option<String>,
        cost_usd: f64,
        num_turns: u32,
    ) -> Self {
        Self {
            text: text.into(),
            session_id,
            cost_usd: sanitize_cost(cost_usd),
            num_turns,
        }
    }
}

/// Clamp a reported cost to a finite, non-negative value.
pub fn sanitize_cost(cost_usd: f64) -> f64 {
    if cost_usd.is_finite() && cost_usd > 0.0 {
        cost_usd
    } else {
        0.0
    }
}

/// The agent's self-report from turn 2.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionData {
    pub process_steps: Vec<String>,
    pub what_worked: Vec<String>,
    pub what_didnt_work: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    /// `true` when parsed from a well-formed structured response, `false`
    /// when recovered heuristically from prose.
    pub is_structured: bool,
}

impl ReflectionData {
    pub fn is_empty(&self) -> bool {
        self.process_steps.is_empty()
            && self.what_worked.is_empty()
            && self.what_didnt_work.is_empty()
            && self.improvement_suggestions.is_empty()
    }
}

/// Classification of a per-test failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RecursionLimitExceeded,
    Timeout,
    InvocationError,
    TurnBudgetExhausted,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RecursionLimitExceeded => "recursion_limit_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvocationError => "invocation_error",
            ErrorKind::TurnBudgetExhausted => "turn_budget_exhausted",
        }
    }
}

/// Error attached to a [`TestResult`].
///
/// `turn` is 1 or 2 for the turn that failed, 0 when no turn ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub turn: u8,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, turn: u8, message: impl Into<String>) -> Self {
        Self {
            kind,
            turn,
            message: message.into(),
        }
    }
}

/// Durable outcome of one test case. Written exactly once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestResult {
    pub schema_version: String,
    pub test_id: String,
    pub prompt: String,
    /// True iff turn 1 produced output within budget.
    pub success: bool,
    pub turn1: Option<TurnOutcome>,
    /// Raw reflection response, kept so extraction can be redone later.
    pub turn2: Option<TurnOutcome>,
    pub turn2_reflection: Option<ReflectionData>,
    pub total_cost_usd: f64,
    pub duration_seconds: f64,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub error: Option<ErrorInfo>,
}

/// Category a theme was collected from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeCategory {
    WhatWorked,
    WhatDidntWork,
    ImprovementSuggestions,
}

impl ThemeCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeCategory::WhatWorked => "what_worked",
            ThemeCategory::WhatDidntWork => "what_didnt_work",
            ThemeCategory::ImprovementSuggestions => "improvement_suggestions",
        }
    }
}

/// A cluster of near-identical reflection items across tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    pub category: ThemeCategory,
    /// First-encountered phrasing.
    pub label: String,
    /// Distinct supporting phrasings in first-seen order.
    pub suggestions: Vec<String>,
    /// Number of distinct tests contributing to the theme.
    pub frequency: usize,
    pub contributors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedTestDetail {
    pub test_id: String,
    pub prompt: String,
    pub error: Option<ErrorInfo>,
}

/// Suite statistics and ranked themes, derived from a set of results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub total_cost_usd: f64,
    pub total_duration_seconds: f64,
    pub avg_turns_per_test: f64,
    pub avg_cost_per_test: f64,
    pub avg_duration_per_test: f64,
    pub themes: Vec<Theme>,
    pub failed_test_details: Vec<FailedTestDetail>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_outcome_clamps_cost() {
        assert_eq!(TurnOutcome::new("x", None, -1.0, 1).cost_usd, 0.0);
        assert_eq!(TurnOutcome::new("x", None, f64::NAN, 1).cost_usd, 0.0);
        assert_eq!(TurnOutcome::new("x", None, 0.25, 1).cost_usd, 0.25);
    }

    #[test]
    fn partial_result_document_loads_with_defaults() {
        let result: TestResult =
            serde_json::from_str(r#"{"test_id": "a", "success": true}"#).expect("parse");
        assert_eq!(result.test_id, "a");
        assert!(result.success);
        assert!(result.turn1.is_none());
        assert_eq!(result.total_cost_usd, 0.0);
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let info = ErrorInfo::new(ErrorKind::TurnBudgetExhausted, 2, "no turns left");
        let json = serde_json::to_string(&info).expect("serialize");
        assert!(json.contains("\"turn_budget_exhausted\""));
        assert_eq!(ErrorKind::TurnBudgetExhausted.as_str(), "turn_budget_exhausted");
    }

    #[test]
    fn suite_config_defaults_max_turns() {
        let cfg: SuiteConfig =
            serde_json::from_str(r#"{"name": "s", "agent_dir": "/tmp"}"#).expect("parse");
        assert_eq!(cfg.max_turns, DEFAULT_MAX_TURNS);
        assert!(cfg.allowed_tools.is_none());
    }
}
