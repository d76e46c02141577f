//! Durable per-run result directory.
//!
//! Layout: `<results_root>/<suite>/<YYYYmmdd_HHMMSS>/` holding one
//! `<test_id>.json` per finished test, `_run.json` describing the run, and the
//! aggregate artifacts. Result files are created exclusively, and both the
//! file and the run directory entry are synced before [`ResultStore::persist`]
//! returns, so a crash never loses an acknowledged result and a rerun never
//! overwrites one.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::types::{AggregateSummary, SCHEMA_VERSION, TestResult};

pub const RUN_META_FILE: &str = "_run.json";
pub const SUMMARY_FILE: &str = "aggregate-summary.json";
pub const REPORT_FILE: &str = "aggregate-report.md";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("result file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialize {}: {source}", .path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(action: &'static str, path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Metadata written once at the start of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: String,
    pub suite_name: String,
    /// Hex SHA-256 of the suite file as read.
    pub suite_sha256: String,
    pub run_stamp: String,
    pub started_at: String,
    pub depth: u32,
    /// `None` when invocations were unbounded.
    pub timeout_seconds: Option<u64>,
    pub test_count: usize,
    pub jobs: usize,
}

/// Contents of `aggregate-summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub schema_version: String,
    pub suite_name: String,
    pub generated_at: String,
    pub results_dir: PathBuf,
    pub summary: AggregateSummary,
    /// Files skipped while loading results.
    pub warnings: Vec<String>,
}

/// Results read back from a run directory.
#[derive(Debug, Default)]
pub struct LoadedResults {
    pub results: Vec<TestResult>,
    pub warnings: Vec<String>,
}

/// Handle to one run directory.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    /// Create a fresh run directory.
    ///
    /// When two runs share a stamp the later one gets a numeric suffix rather
    /// than writing into the earlier directory.
    pub fn create(
        results_root: &Path,
        suite_name: &str,
        run_stamp: &str,
    ) -> Result<Self, StoreError> {
        let suite_dir = results_root.join(suite_name);
        fs::create_dir_all(&suite_dir)
            .map_err(|err| StoreError::io("create directory", &suite_dir, err))?;
        let mut attempt = 1u32;
        loop {
            let name = if attempt == 1 {
                run_stamp.to_string()
            } else {
                format!("{run_stamp}_{attempt}")
            };
            let dir = suite_dir.join(name);
            match fs::create_dir(&dir) {
                Ok(()) => {
                    info!(dir = %dir.display(), "created run directory");
                    return Ok(Self { dir });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(err) => return Err(StoreError::io("create directory", &dir, err)),
            }
        }
    }

    /// Use an existing run directory, e.g. to re-aggregate it.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        if !dir.is_dir() {
            return Err(StoreError::io(
                "open run directory",
                dir,
                io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn result_path(&self, test_id: &str) -> PathBuf {
        self.dir.join(format!("{test_id}.json"))
    }

    /// Write `<test_id>.json`. Fails if the file exists; durable on return.
    pub fn persist(&self, result: &TestResult) -> Result<PathBuf, StoreError> {
        let path = self.result_path(&result.test_id);
        let json = to_json(&path, result)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(path));
            }
            Err(err) => return Err(StoreError::io("create result file", &path, err)),
        };
        write_synced(&mut file, &path, json.as_bytes())?;
        sync_dir(&self.dir)?;
        debug!(path = %path.display(), "persisted result");
        Ok(path)
    }

    pub fn write_run_meta(&self, meta: &RunMeta) -> Result<PathBuf, StoreError> {
        let path = self.dir.join(RUN_META_FILE);
        write_atomic(&path, to_json(&path, meta)?.as_bytes())?;
        Ok(path)
    }

    pub fn load_run_meta(&self) -> Option<RunMeta> {
        let path = self.dir.join(RUN_META_FILE);
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(meta) => Some(meta),
            Err(err) => {
                warn!(path = %path.display(), err = %err, "ignoring malformed run metadata");
                None
            }
        }
    }

    pub fn write_summary(&self, document: &SummaryDocument) -> Result<PathBuf, StoreError> {
        let path = self.dir.join(SUMMARY_FILE);
        write_atomic(&path, to_json(&path, document)?.as_bytes())?;
        Ok(path)
    }

    pub fn write_report(&self, markdown: &str) -> Result<PathBuf, StoreError> {
        let path = self.dir.join(REPORT_FILE);
        write_atomic(&path, markdown.as_bytes())?;
        Ok(path)
    }

    /// Read every result file in the directory, in file-name order.
    ///
    /// Unreadable or malformed files become warnings; only a failure to list
    /// the directory is an error.
    pub fn load_results(&self) -> Result<LoadedResults, StoreError> {
        let entries =
            fs::read_dir(&self.dir).map_err(|err| StoreError::io("read directory", &self.dir, err))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_result_file(path))
            .collect();
        paths.sort();

        let mut loaded = LoadedResults::default();
        for path in paths {
            let parsed = fs::read_to_string(&path)
                .map_err(|err| err.to_string())
                .and_then(|contents| {
                    serde_json::from_str::<TestResult>(&contents).map_err(|err| err.to_string())
                });
            match parsed {
                Ok(result) => loaded.results.push(result),
                Err(err) => {
                    warn!(path = %path.display(), err = %err, "skipping result file");
                    loaded
                        .warnings
                        .push(format!("skipped {}: {err}", path.display()));
                }
            }
        }
        debug!(
            loaded = loaded.results.len(),
            skipped = loaded.warnings.len(),
            "loaded results"
        );
        Ok(loaded)
    }
}

fn is_result_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    path.is_file() && name.ends_with(".json") && !name.starts_with('_') && name != SUMMARY_FILE
}

fn to_json<T: Serialize>(path: &Path, value: &T) -> Result<String, StoreError> {
    let mut json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');
    Ok(json)
}

fn write_synced(file: &mut File, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    file.write_all(bytes)
        .map_err(|err| StoreError::io("write", path, err))?;
    file.sync_all()
        .map_err(|err| StoreError::io("fsync", path, err))
}

/// Flush a directory's entries so newly created files survive a crash.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|err| StoreError::io("fsync directory", dir, err))
}

// Directories cannot be opened as files here; the file sync is all we get.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map_or_else(|| "artifact".to_string(), |name| name.to_string_lossy().to_string());
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));
    let mut file =
        File::create(&tmp_path).map_err(|err| StoreError::io("create temp file", &tmp_path, err))?;
    write_synced(&mut file, &tmp_path, bytes)?;
    drop(file);
    fs::rename(&tmp_path, path).map_err(|err| StoreError::io("rename", path, err))
}

/// Directory name for a run started at `now`.
pub fn run_stamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// RFC 3339 UTC timestamp with second precision.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn new_summary_document(
    suite_name: &str,
    results_dir: &Path,
    summary: AggregateSummary,
    warnings: Vec<String>,
) -> SummaryDocument {
    SummaryDocument {
        schema_version: SCHEMA_VERSION.to_string(),
        suite_name: suite_name.to_string(),
        generated_at: timestamp(Utc::now()),
        results_dir: results_dir.to_path_buf(),
        summary,
        warnings,
    }
}
