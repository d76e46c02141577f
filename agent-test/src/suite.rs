//! Suite file parsing and validation.
//!
//! Suites are YAML files naming an agent directory and a list of tests.
//! Validation reports every problem at once rather than stopping at the first.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use harness::core::types::{SuiteConfig, TestCase};
use harness::io::store::{RUN_META_FILE, SUMMARY_FILE};

/// Suite document as written by users. Everything is optional here so that
/// validation can describe what is missing.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SuiteFile {
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    pub agent_dir: Option<PathBuf>,
    pub max_turns: Option<u32>,
    pub allowed_tools: Option<String>,
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub tests: Vec<TestEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TestEntry {
    pub id: Option<String>,
    pub prompt: Option<String>,
    #[serde(default)]
    pub expected_behavior: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// A validated suite ready to run.
#[derive(Debug, Clone)]
pub struct LoadedSuite {
    pub path: PathBuf,
    pub config: SuiteConfig,
    pub tests: Vec<TestCase>,
    /// Hex SHA-256 of the file contents.
    pub sha256: String,
}

impl SuiteFile {
    pub fn parse_str(contents: &str) -> Result<Self> {
        let suite: SuiteFile = serde_yaml::from_str(contents).context("parse suite yaml")?;
        Ok(suite)
    }

    /// Every validation problem, in document order. Relative `agent_dir`
    /// values resolve against `base_dir`.
    pub fn problems(&self, base_dir: &Path) -> Vec<String> {
        let mut problems = Vec::new();

        match self.name.as_deref().map(str::trim) {
            None | Some("") => problems.push("name must be non-empty".to_string()),
            Some(name) => {
                if let Err(reason) = check_path_component(name) {
                    problems.push(format!("name {reason}"));
                }
            }
        }

        match self.resolved_agent_dir(base_dir) {
            None => problems.push("agent_dir is required".to_string()),
            Some(dir) if !dir.exists() => {
                problems.push(format!("agent_dir {} does not exist", dir.display()));
            }
            Some(dir) if !dir.is_dir() => {
                problems.push(format!("agent_dir {} is not a directory", dir.display()));
            }
            Some(_) => {}
        }

        if self.max_turns == Some(0) {
            problems.push("max_turns must be > 0".to_string());
        }

        if self.tests.is_empty() {
            problems.push("tests must be a non-empty list".to_string());
        }
        let mut seen = HashSet::new();
        // Result files are `<id>.json`; case-insensitive filesystems fold these.
        let mut seen_folded = HashSet::new();
        for (index, test) in self.tests.iter().enumerate() {
            let label = test
                .id
                .as_deref()
                .map_or_else(|| format!("tests[{index}]"), |id| format!("tests[{index}] ({id})"));
            match test.id.as_deref().map(str::trim) {
                None | Some("") => problems.push(format!("{label}: id must be non-empty")),
                Some(id) => {
                    if let Err(reason) = check_test_id(id) {
                        problems.push(format!("{label}: id {reason}"));
                    }
                    if !seen.insert(id) {
                        problems.push(format!("{label}: duplicate id"));
                    } else if !seen_folded.insert(id.to_ascii_lowercase()) {
                        problems.push(format!("{label}: duplicate id (case-insensitive)"));
                    }
                }
            }
            if test.prompt.as_deref().is_none_or(|prompt| prompt.trim().is_empty()) {
                problems.push(format!("{label}: prompt must be non-empty"));
            }
        }
        problems
    }

    pub fn resolved_agent_dir(&self, base_dir: &Path) -> Option<PathBuf> {
        let dir = self.agent_dir.as_ref()?;
        if dir.as_os_str().is_empty() {
            return None;
        }
        Some(if dir.is_absolute() {
            dir.clone()
        } else {
            base_dir.join(dir)
        })
    }
}

/// Read, parse, and validate a suite file.
///
/// `default_max_turns` applies when the suite omits `max_turns`.
pub fn load_suite(path: &Path, default_max_turns: u32) -> Result<LoadedSuite> {
    let bytes = fs::read(path).with_context(|| format!("read suite {}", path.display()))?;
    let contents = String::from_utf8(bytes.clone())
        .with_context(|| format!("suite {} is not UTF-8", path.display()))?;
    let suite = SuiteFile::parse_str(&contents)
        .with_context(|| format!("load suite {}", path.display()))?;
    let base_dir = suite_base_dir(path);
    let problems = suite.problems(&base_dir);
    if !problems.is_empty() {
        bail!(
            "suite {} is invalid:\n- {}",
            path.display(),
            problems.join("\n- ")
        );
    }

    let agent_dir = suite
        .resolved_agent_dir(&base_dir)
        .context("agent_dir is required")?;
    let config = SuiteConfig {
        name: suite.name.as_deref().unwrap_or_default().trim().to_string(),
        description: suite.description.trim().to_string(),
        agent_dir,
        max_turns: suite.max_turns.unwrap_or(default_max_turns),
        allowed_tools: suite.allowed_tools.clone(),
        permission_mode: suite.permission_mode.clone(),
    };
    let tests = suite
        .tests
        .into_iter()
        .map(|entry| TestCase {
            id: entry.id.unwrap_or_default().trim().to_string(),
            prompt: entry.prompt.unwrap_or_default(),
            expected_behavior: entry.expected_behavior,
            tags: entry.tags,
        })
        .collect();
    Ok(LoadedSuite {
        path: path.to_path_buf(),
        config,
        tests,
        sha256: hex::encode(Sha256::digest(&bytes)),
    })
}

/// Directory relative `agent_dir` values resolve against.
pub fn suite_base_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn check_path_component(value: &str) -> std::result::Result<(), &'static str> {
    if value.contains('/') || value.contains('\\') {
        return Err("must not contain path separators");
    }
    if value.contains("..") {
        return Err("must not contain '..'");
    }
    Ok(())
}

/// Test ids double as result file stems.
fn check_test_id(id: &str) -> std::result::Result<(), &'static str> {
    check_path_component(id)?;
    if !id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.')
    {
        return Err("must use [A-Za-z0-9._-] only");
    }
    if id.starts_with('_') || id.starts_with('.') {
        return Err("must not start with '_' or '.'");
    }
    let file_name = format!("{id}.json");
    if file_name == SUMMARY_FILE || file_name == RUN_META_FILE {
        return Err("collides with a run artifact name");
    }
    Ok(())
}
