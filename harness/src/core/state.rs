//! Per-test lifecycle states and their legal transitions.

use anyhow::{Result, bail};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestState {
    Pending,
    Turn1Running,
    Turn1Failed,
    Turn1Succeeded,
    Turn2Running,
    Turn2Failed,
    Turn2Succeeded,
    /// Turn 1 succeeded but the reflection could not be attempted (no turns
    /// left or no session to resume).
    Turn2Skipped,
    Recorded,
}

impl TestState {
    pub fn can_transition_to(self, next: TestState) -> bool {
        use TestState::{
            Pending, Recorded, Turn1Failed, Turn1Running, Turn1Succeeded, Turn2Failed,
            Turn2Running, Turn2Skipped, Turn2Succeeded,
        };
        matches!(
            (self, next),
            (Pending, Turn1Running)
                | (Pending, Recorded)
                | (Turn1Running, Turn1Failed)
                | (Turn1Running, Turn1Succeeded)
                | (Turn1Succeeded, Turn2Running)
                | (Turn1Succeeded, Turn2Skipped)
                | (Turn2Running, Turn2Failed)
                | (Turn2Running, Turn2Succeeded)
                | (Turn1Failed, Recorded)
                | (Turn2Failed, Recorded)
                | (Turn2Succeeded, Recorded)
                | (Turn2Skipped, Recorded)
        )
    }
}

/// Tracks one test's state and rejects illegal transitions.
///
/// `Pending -> Recorded` covers a test refused by the recursion guard.
#[derive(Debug)]
pub struct TestLifecycle<'a> {
    test_id: &'a str,
    state: TestState,
}

impl<'a> TestLifecycle<'a> {
    pub fn new(test_id: &'a str) -> Self {
        Self {
            test_id,
            state: TestState::Pending,
        }
    }

    pub fn state(&self) -> TestState {
        self.state
    }

    pub fn advance(&mut self, next: TestState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            bail!(
                "illegal transition {:?} -> {:?} for test {}",
                self.state,
                next,
                self.test_id
            );
        }
        debug!(test_id = self.test_id, from = ?self.state, to = ?next, "test state");
        self.state = next;
        Ok(())
    }
}
