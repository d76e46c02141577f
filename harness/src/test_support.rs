//! Test-only helpers: a scripted invoker and record builders.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use crate::core::types::{SuiteConfig, TestCase, TurnOutcome};
use crate::io::invoker::{InvokeError, TurnInvoker, TurnRequest};

/// Invoker that replays queued responses and records every request.
///
/// An exhausted script answers with the fallback outcome when one was given,
/// otherwise with an invocation error.
#[derive(Debug, Default)]
pub struct ScriptedInvoker {
    script: Mutex<VecDeque<Result<TurnOutcome, InvokeError>>>,
    fallback: Option<TurnOutcome>,
    requests: Mutex<Vec<TurnRequest>>,
}

impl ScriptedInvoker {
    pub fn new(script: Vec<Result<TurnOutcome, InvokeError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Answer every request with `outcome`.
    pub fn repeating(outcome: TurnOutcome) -> Self {
        Self {
            fallback: Some(outcome),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().map_or(0, |requests| requests.len())
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

impl TurnInvoker for ScriptedInvoker {
    fn invoke(&self, request: &TurnRequest) -> Result<TurnOutcome, InvokeError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front());
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(outcome)) => Ok(outcome.clone()),
            (None, None) => Err(InvokeError::Invocation {
                message: "scripted invoker has no response left".to_string(),
                partial_cost_usd: None,
            }),
        }
    }
}

pub fn outcome(text: &str, session_id: Option<&str>, cost_usd: f64, num_turns: u32) -> TurnOutcome {
    TurnOutcome::new(text, session_id.map(str::to_string), cost_usd, num_turns)
}

pub fn test_case(id: &str, prompt: &str) -> TestCase {
    TestCase {
        id: id.to_string(),
        prompt: prompt.to_string(),
        expected_behavior: String::new(),
        tags: Default::default(),
    }
}

pub fn suite_config(agent_dir: &Path, max_turns: u32) -> SuiteConfig {
    SuiteConfig {
        name: "suite".to_string(),
        description: String::new(),
        agent_dir: agent_dir.to_path_buf(),
        max_turns,
        allowed_tools: None,
        permission_mode: None,
    }
}
