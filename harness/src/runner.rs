//! Two-turn execution of a single test case.
//!
//! Turn 1 sends the test prompt. If it succeeds, turn 2 resumes the same
//! session with the reflection prompt. Only turn 1 decides `success`; a
//! failed or skipped reflection is recorded as a note on an otherwise
//! successful result.

use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::core::budget::{TimeoutPolicy, remaining_turns};
use crate::core::depth::RecursionGuard;
use crate::core::reflection::{REFLECTION_PROMPT, ReflectionExtractor};
use crate::core::state::{TestLifecycle, TestState};
use crate::core::types::{
    ErrorInfo, ErrorKind, SCHEMA_VERSION, SuiteConfig, TestCase, TestResult,
};
use crate::io::invoker::{InvokeError, TurnInvoker, TurnRequest};
use crate::io::store;

/// Everything a test needs besides the case itself. Shared across workers.
#[derive(Debug)]
pub struct RunContext<'a, I: TurnInvoker> {
    pub suite: &'a SuiteConfig,
    pub guard: &'a RecursionGuard,
    pub invoker: &'a I,
    pub policy: TimeoutPolicy,
    pub extractor: &'a ReflectionExtractor,
}

/// Run one test through both turns.
///
/// Invocation failures are contained in the returned result. An `Err` means
/// the lifecycle was driven through an illegal transition.
#[instrument(skip_all, fields(test_id = %case.id))]
pub fn run_test<I: TurnInvoker>(case: &TestCase, ctx: &RunContext<'_, I>) -> Result<TestResult> {
    let started = Instant::now();
    let mut lifecycle = TestLifecycle::new(&case.id);
    let mut result = TestResult {
        schema_version: SCHEMA_VERSION.to_string(),
        test_id: case.id.clone(),
        prompt: case.prompt.clone(),
        timestamp: store::timestamp(Utc::now()),
        ..TestResult::default()
    };

    let token = match ctx.guard.enter() {
        Ok(token) => token,
        Err(err) => {
            warn!(err = %err, "refusing to run test");
            result.error = Some(ErrorInfo::new(
                ErrorKind::RecursionLimitExceeded,
                0,
                err.to_string(),
            ));
            lifecycle.advance(TestState::Recorded)?;
            result.duration_seconds = elapsed_seconds(started);
            return Ok(result);
        }
    };

    lifecycle.advance(TestState::Turn1Running)?;
    let turn1_request = TurnRequest {
        prompt: case.prompt.clone(),
        working_dir: ctx.suite.agent_dir.clone(),
        session_id: None,
        turn_budget: ctx.suite.max_turns,
        timeout: ctx.policy.duration(),
        allowed_tools: ctx.suite.allowed_tools.clone(),
        permission_mode: ctx.suite.permission_mode.clone(),
        depth: token.depth(),
    };
    let turn1 = match ctx.invoker.invoke(&turn1_request) {
        Ok(outcome) => outcome,
        Err(err) => {
            lifecycle.advance(TestState::Turn1Failed)?;
            warn!(err = %err, "turn 1 failed");
            result.total_cost_usd = err.partial_cost_usd();
            result.error = Some(turn_error(&err, 1));
            if let InvokeError::BudgetExhausted { outcome } = err {
                result.turn1 = Some(outcome);
            }
            lifecycle.advance(TestState::Recorded)?;
            token.exit();
            result.duration_seconds = elapsed_seconds(started);
            return Ok(result);
        }
    };
    lifecycle.advance(TestState::Turn1Succeeded)?;
    result.success = true;
    result.total_cost_usd = turn1.cost_usd;

    let budget = remaining_turns(ctx.suite.max_turns, turn1.num_turns);
    let session_id = turn1.session_id.clone();
    let consumed = turn1.num_turns;
    result.turn1 = Some(turn1);

    match (budget, session_id) {
        (None, _) => {
            lifecycle.advance(TestState::Turn2Skipped)?;
            info!(consumed, max_turns = ctx.suite.max_turns, "no turns left for reflection");
            result.error = Some(ErrorInfo::new(
                ErrorKind::TurnBudgetExhausted,
                2,
                format!(
                    "turn 1 used {consumed} of {} turns; no budget left for reflection",
                    ctx.suite.max_turns
                ),
            ));
        }
        (Some(_), None) => {
            lifecycle.advance(TestState::Turn2Skipped)?;
            warn!("turn 1 returned no session id; skipping reflection");
            result.error = Some(ErrorInfo::new(
                ErrorKind::InvocationError,
                2,
                "turn 1 returned no session id to resume",
            ));
        }
        (Some(turn_budget), Some(session_id)) => {
            lifecycle.advance(TestState::Turn2Running)?;
            let turn2_request = TurnRequest {
                prompt: REFLECTION_PROMPT.to_string(),
                session_id: Some(session_id),
                turn_budget,
                ..turn1_request
            };
            match ctx.invoker.invoke(&turn2_request) {
                Ok(outcome) => {
                    lifecycle.advance(TestState::Turn2Succeeded)?;
                    result.total_cost_usd += outcome.cost_usd;
                    result.turn2_reflection = Some(ctx.extractor.extract(Some(&outcome.text)));
                    result.turn2 = Some(outcome);
                }
                Err(err) => {
                    lifecycle.advance(TestState::Turn2Failed)?;
                    warn!(err = %err, "reflection turn failed");
                    result.total_cost_usd += err.partial_cost_usd();
                    result.error = Some(turn_error(&err, 2));
                    if let InvokeError::BudgetExhausted { outcome } = err {
                        result.turn2 = Some(outcome);
                    }
                }
            }
        }
    }

    lifecycle.advance(TestState::Recorded)?;
    token.exit();
    result.duration_seconds = elapsed_seconds(started);
    info!(
        success = result.success,
        cost_usd = result.total_cost_usd,
        duration_seconds = result.duration_seconds,
        "test finished"
    );
    Ok(result)
}

fn turn_error(err: &InvokeError, turn: u8) -> ErrorInfo {
    let kind = match err {
        InvokeError::Timeout { .. } => ErrorKind::Timeout,
        InvokeError::BudgetExhausted { .. } => ErrorKind::TurnBudgetExhausted,
        InvokeError::Invocation { .. } => ErrorKind::InvocationError,
    };
    ErrorInfo::new(kind, turn, format!("turn {turn}: {err}"))
}

fn elapsed_seconds(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 100.0).round() / 100.0
}
