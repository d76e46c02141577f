//! Stable exit codes for `agent-test` commands.

/// Command succeeded; for `run`, every test passed.
pub const OK: i32 = 0;
/// Invalid suite, config, or arguments, or a recursion ceiling refusal.
pub const INVALID: i32 = 1;
/// `run` finished but at least one test failed.
pub const TESTS_FAILED: i32 = 2;
/// A result could not be written. Earlier results are intact.
pub const PERSISTENCE: i32 = 3;
/// Interrupted (Ctrl-C); persisted results were aggregated.
pub const INTERRUPTED: i32 = 130;
