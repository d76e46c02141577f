//! Two-turn agent test harness.
//!
//! Every test case is sent to an agent (turn 1), and the agent is then asked
//! to reflect on how it went (turn 2). Results are persisted one file per
//! test and later aggregated into suite statistics and ranked themes. The
//! architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (recursion guard, lifecycle
//!   states, reflection extraction, theme grouping, aggregation). No I/O.
//! - **[`io`]**: Side-effecting operations (agent processes, configuration,
//!   the result store). The agent backend sits behind a trait so tests can
//!   script it.
//!
//! Orchestration modules ([`runner`], [`suite_run`]) combine the two.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod runner;
pub mod suite_run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
