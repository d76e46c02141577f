//! Side-effecting helpers: processes, configuration, environment, storage.

pub mod config;
pub mod env;
pub mod invoker;
pub mod process;
pub mod store;
