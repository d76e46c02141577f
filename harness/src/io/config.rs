//! Harness configuration, read from `agent-test.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::themes::{DEFAULT_THEME_SIMILARITY, ThemeOptions};
use crate::core::types::DEFAULT_MAX_TURNS;

/// File name looked up in the working directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "agent-test.toml";

/// Harness configuration (TOML).
///
/// Missing fields take their defaults, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Agent CLI executable, resolved through `PATH` unless absolute.
    pub claude_binary: String,

    /// Directory created under the suite's `agent_dir` to hold runs.
    pub results_dir_name: String,

    /// Keep at most this many bytes of agent stdout/stderr per invocation.
    pub output_limit_bytes: usize,

    /// Per-test USD figure used for the pre-run cost estimate.
    pub cost_per_test_estimate: f64,

    /// Jaccard threshold for grouping reflection themes.
    pub theme_similarity: f64,

    /// Used when a suite omits `max_turns`.
    pub default_max_turns: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            claude_binary: "claude".to_string(),
            results_dir_name: ".agent-test-results".to_string(),
            output_limit_bytes: 1_000_000,
            cost_per_test_estimate: 0.08,
            theme_similarity: DEFAULT_THEME_SIMILARITY,
            default_max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

impl HarnessConfig {
    pub fn validate(&self) -> Result<()> {
        if self.claude_binary.trim().is_empty() {
            return Err(anyhow!("claude_binary must be non-empty"));
        }
        if self.results_dir_name.trim().is_empty() {
            return Err(anyhow!("results_dir_name must be non-empty"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if !(self.cost_per_test_estimate.is_finite() && self.cost_per_test_estimate >= 0.0) {
            return Err(anyhow!("cost_per_test_estimate must be >= 0"));
        }
        if !(self.theme_similarity > 0.0 && self.theme_similarity <= 1.0) {
            return Err(anyhow!("theme_similarity must be in (0, 1]"));
        }
        if self.default_max_turns == 0 {
            return Err(anyhow!("default_max_turns must be > 0"));
        }
        Ok(())
    }

    pub fn theme_options(&self) -> ThemeOptions {
        ThemeOptions {
            similarity: self.theme_similarity,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `HarnessConfig::default()`.
pub fn load_config(path: &Path) -> Result<HarnessConfig> {
    if !path.exists() {
        let cfg = HarnessConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: HarnessConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Resolve the config to use: an explicit path must exist, otherwise
/// `agent-test.toml` in `cwd` is used when present.
pub fn resolve_config(explicit: Option<&Path>, cwd: &Path) -> Result<HarnessConfig> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("config file not found: {}", path.display()));
            }
            load_config(path)
        }
        None => load_config(&default_config_path(cwd)),
    }
}

pub fn default_config_path(cwd: &Path) -> PathBuf {
    cwd.join(CONFIG_FILE_NAME)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &HarnessConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, HarnessConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent-test.toml");
        let cfg = HarnessConfig {
            claude_binary: "/opt/claude".to_string(),
            theme_similarity: 0.6,
            ..HarnessConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent-test.toml");
        fs::write(&path, "cost_per_test_estimate = 0.5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.cost_per_test_estimate, 0.5);
        assert_eq!(cfg.claude_binary, "claude");
    }

    #[test]
    fn rejects_out_of_range_similarity() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agent-test.toml");
        fs::write(&path, "theme_similarity = 0.0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("theme_similarity"));
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("nope.toml");
        assert!(resolve_config(Some(&missing), temp.path()).is_err());
        assert_eq!(
            resolve_config(None, temp.path()).expect("default"),
            HarnessConfig::default()
        );
    }
}
