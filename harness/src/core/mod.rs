//! Deterministic logic for the test harness.
//!
//! Core modules are free of I/O. They operate on in-memory records and return
//! deterministic outputs suitable for tests.

pub mod aggregate;
pub mod budget;
pub mod cues;
pub mod depth;
pub mod reflection;
pub mod state;
pub mod themes;
pub mod types;
