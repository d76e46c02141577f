//! Recursion guard for nested suite runs.
//!
//! An agent under test can itself launch the harness. The starting depth is
//! handed in by the caller (the CLI reads it from the environment) and every
//! invocation is told the depth it runs at, so nested runs inherit and
//! increment the same count.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;
use tracing::{debug, warn};

/// Deepest nesting level at which a test may still invoke the agent.
pub const MAX_RECURSION_DEPTH: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("maximum test recursion depth ({max}) exceeded at depth {depth}")]
pub struct DepthExceeded {
    pub depth: u32,
    pub max: u32,
}

/// Tracks the run's starting depth and its outstanding tokens.
#[derive(Debug, Clone)]
pub struct RecursionGuard {
    starting_depth: u32,
    active: Arc<AtomicU32>,
}

impl RecursionGuard {
    pub fn new(starting_depth: u32) -> Self {
        Self {
            starting_depth,
            active: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn starting_depth(&self) -> u32 {
        self.starting_depth
    }

    /// Number of tokens currently held.
    pub fn active(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    /// Check performed once at the suite's own entry point.
    ///
    /// A run entered beyond the ceiling aborts outright; a run entered exactly
    /// at the ceiling proceeds but every test fails in [`Self::enter`].
    pub fn check_entry(&self) -> Result<(), DepthExceeded> {
        if self.starting_depth > MAX_RECURSION_DEPTH {
            warn!(depth = self.starting_depth, "suite entered beyond recursion ceiling");
            return Err(DepthExceeded {
                depth: self.starting_depth,
                max: MAX_RECURSION_DEPTH,
            });
        }
        Ok(())
    }

    /// Acquire a token for one test. Fails before any invocation happens.
    pub fn enter(&self) -> Result<DepthToken, DepthExceeded> {
        if self.starting_depth >= MAX_RECURSION_DEPTH {
            return Err(DepthExceeded {
                depth: self.starting_depth,
                max: MAX_RECURSION_DEPTH,
            });
        }
        let held = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(depth = self.starting_depth + 1, held, "depth token acquired");
        Ok(DepthToken {
            depth: self.starting_depth + 1,
            active: Arc::clone(&self.active),
        })
    }
}

/// Scoped depth acquisition. Released exactly once when dropped.
#[derive(Debug)]
pub struct DepthToken {
    depth: u32,
    active: Arc<AtomicU32>,
}

impl DepthToken {
    /// Depth propagated to invocations made while the token is held.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn exit(self) {}
}

impl Drop for DepthToken {
    fn drop(&mut self) {
        let held = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(depth = self.depth, held, "depth token released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_zero_and_one_permit_nesting() {
        for start in [0, 1] {
            let guard = RecursionGuard::new(start);
            guard.check_entry().expect("entry");
            let token = guard.enter().expect("token");
            assert_eq!(token.depth(), start + 1);
        }
    }

    #[test]
    fn ceiling_fails_every_enter_but_not_entry() {
        let guard = RecursionGuard::new(MAX_RECURSION_DEPTH);
        guard.check_entry().expect("entry at ceiling is allowed");
        let err = guard.enter().expect_err("enter at ceiling");
        assert_eq!(err.depth, 2);
        assert_eq!(guard.active(), 0);
    }

    #[test]
    fn beyond_ceiling_aborts_entry() {
        let guard = RecursionGuard::new(3);
        assert!(guard.check_entry().is_err());
    }

    #[test]
    fn token_released_on_every_exit_path() {
        let guard = RecursionGuard::new(0);
        let token = guard.enter().expect("token");
        assert_eq!(guard.active(), 1);
        token.exit();
        assert_eq!(guard.active(), 0);

        let result: Result<(), &str> = (|| {
            let _token = guard.enter().expect("token");
            Err("turn failed")
        })();
        assert!(result.is_err());
        assert_eq!(guard.active(), 0);

        let unwound = std::panic::catch_unwind(|| {
            let _token = guard.enter().expect("token");
            panic!("invoker panicked");
        });
        assert!(unwound.is_err());
        assert_eq!(guard.active(), 0);
    }

    #[test]
    fn clones_share_the_counter() {
        let guard = RecursionGuard::new(1);
        let clone = guard.clone();
        let _token = clone.enter().expect("token");
        assert_eq!(guard.active(), 1);
    }
}
