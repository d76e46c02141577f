//! Suite execution: runs every test and persists each result as it finishes.
//!
//! Tests are pulled from a shared cursor by `jobs` scoped worker threads
//! (one worker runs the suite sequentially). Each worker owns a test's whole
//! two-turn sequence, including its depth token and result file.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::types::{TestCase, TestResult};
use crate::io::invoker::TurnInvoker;
use crate::io::store::ResultStore;
use crate::runner::{RunContext, run_test};

/// Reported after each test is persisted.
#[derive(Debug, Clone, Copy)]
pub struct TestProgress<'r> {
    /// 1-based position of the test in the suite.
    pub position: usize,
    pub total: usize,
    /// Number of tests persisted so far, this one included.
    pub completed: usize,
    pub result: &'r TestResult,
}

#[derive(Debug, Clone, Copy)]
pub struct SuiteRunOptions<'c> {
    pub jobs: usize,
    /// Raised externally (Ctrl-C) to stop taking new tests.
    pub cancel: &'c AtomicBool,
}

#[derive(Debug, Default)]
pub struct SuiteOutcome {
    /// Persisted results in suite order.
    pub results: Vec<TestResult>,
    /// Tests never started or abandoned because of cancellation.
    pub not_run: Vec<String>,
    pub interrupted: bool,
}

/// Run `cases` and persist each result before reporting it.
///
/// A persistence failure stops all workers and is returned as an error whose
/// root cause is [`crate::io::store::StoreError`]. Results already written
/// stay on disk.
#[instrument(skip_all, fields(tests = cases.len(), jobs = options.jobs))]
pub fn run_suite<I, F>(
    cases: &[TestCase],
    ctx: &RunContext<'_, I>,
    store: &ResultStore,
    options: SuiteRunOptions<'_>,
    on_test: F,
) -> Result<SuiteOutcome>
where
    I: TurnInvoker,
    F: Fn(TestProgress<'_>) + Sync,
{
    let total = cases.len();
    let cursor = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let halt = AtomicBool::new(false);
    let slots: Mutex<Vec<Option<TestResult>>> = Mutex::new(vec![None; total]);
    let failure: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    let workers = options.jobs.max(1).min(total);

    let worker = || {
        loop {
            if options.cancel.load(Ordering::SeqCst) || halt.load(Ordering::SeqCst) {
                break;
            }
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            let Some(case) = cases.get(index) else {
                break;
            };
            let outcome = run_test(case, ctx).and_then(|result| {
                if options.cancel.load(Ordering::SeqCst) {
                    warn!(test_id = %case.id, "run interrupted; discarding in-flight result");
                    return Ok(None);
                }
                store
                    .persist(&result)
                    .with_context(|| format!("persist result for {}", case.id))?;
                Ok(Some(result))
            });
            match outcome {
                Ok(Some(result)) => {
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    on_test(TestProgress {
                        position: index + 1,
                        total,
                        completed: done,
                        result: &result,
                    });
                    if let Ok(mut slots) = slots.lock() {
                        slots[index] = Some(result);
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    halt.store(true, Ordering::SeqCst);
                    if let Ok(mut failure) = failure.lock()
                        && failure.is_none()
                    {
                        *failure = Some(err);
                    }
                    break;
                }
            }
        }
    };

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(&worker);
        }
    });

    if let Some(err) = failure
        .into_inner()
        .map_err(|_| anyhow!("worker panicked while recording a failure"))?
    {
        return Err(err);
    }

    let slots = slots
        .into_inner()
        .map_err(|_| anyhow!("worker panicked while recording a result"))?;
    let mut outcome = SuiteOutcome {
        interrupted: options.cancel.load(Ordering::SeqCst),
        ..SuiteOutcome::default()
    };
    for (case, slot) in cases.iter().zip(slots) {
        match slot {
            Some(result) => outcome.results.push(result),
            None => outcome.not_run.push(case.id.clone()),
        }
    }
    info!(
        persisted = outcome.results.len(),
        not_run = outcome.not_run.len(),
        interrupted = outcome.interrupted,
        "suite finished"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::core::budget::TimeoutPolicy;
    use crate::core::depth::RecursionGuard;
    use crate::core::reflection::ReflectionExtractor;
    use crate::io::store::StoreError;
    use crate::test_support::{ScriptedInvoker, outcome, suite_config, test_case};

    #[test]
    fn persists_every_result_in_suite_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suite = suite_config(temp.path(), 10);
        let cases = vec![test_case("a", "one"), test_case("b", "two")];
        let invoker = ScriptedInvoker::repeating(outcome("done", None, 0.01, 1));
        let guard = RecursionGuard::new(0);
        let extractor = ReflectionExtractor::new().expect("extractor");
        let ctx = RunContext {
            suite: &suite,
            guard: &guard,
            invoker: &invoker,
            policy: TimeoutPolicy::Custom(Duration::from_secs(5)),
            extractor: &extractor,
        };
        let store = ResultStore::create(temp.path(), "s", "stamp").expect("store");
        let cancel = AtomicBool::new(false);
        let seen = Mutex::new(Vec::new());

        let outcome = run_suite(
            &cases,
            &ctx,
            &store,
            SuiteRunOptions {
                jobs: 2,
                cancel: &cancel,
            },
            |progress| {
                assert!(store.result_path(&progress.result.test_id).exists());
                seen.lock().expect("lock").push(progress.position);
            },
        )
        .expect("run");

        let ids: Vec<_> = outcome.results.iter().map(|r| r.test_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!outcome.interrupted);
        let mut seen = seen.into_inner().expect("lock");
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(guard.active(), 0);
    }

    #[test]
    fn cancelled_run_starts_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suite = suite_config(temp.path(), 10);
        let cases = vec![test_case("a", "one")];
        let invoker = ScriptedInvoker::new(Vec::new());
        let guard = RecursionGuard::new(0);
        let extractor = ReflectionExtractor::new().expect("extractor");
        let ctx = RunContext {
            suite: &suite,
            guard: &guard,
            invoker: &invoker,
            policy: TimeoutPolicy::Unbounded,
            extractor: &extractor,
        };
        let store = ResultStore::create(temp.path(), "s", "stamp").expect("store");
        let cancel = AtomicBool::new(true);

        let outcome = run_suite(
            &cases,
            &ctx,
            &store,
            SuiteRunOptions {
                jobs: 1,
                cancel: &cancel,
            },
            |_| {},
        )
        .expect("run");
        assert!(outcome.interrupted);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.not_run, vec!["a"]);
        assert_eq!(invoker.calls(), 0);
    }

    #[test]
    fn persistence_failure_aborts_with_store_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let suite = suite_config(temp.path(), 10);
        let cases = vec![test_case("a", "one"), test_case("b", "two")];
        let invoker = ScriptedInvoker::repeating(outcome("done", None, 0.01, 1));
        let guard = RecursionGuard::new(0);
        let extractor = ReflectionExtractor::new().expect("extractor");
        let ctx = RunContext {
            suite: &suite,
            guard: &guard,
            invoker: &invoker,
            policy: TimeoutPolicy::Unbounded,
            extractor: &extractor,
        };
        let store = ResultStore::create(temp.path(), "s", "stamp").expect("store");
        std::fs::write(store.result_path("a"), "{}").expect("pre-existing file");
        let cancel = AtomicBool::new(false);

        let err = run_suite(
            &cases,
            &ctx,
            &store,
            SuiteRunOptions {
                jobs: 1,
                cancel: &cancel,
            },
            |_| {},
        )
        .expect_err("store failure");
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::AlreadyExists(_))
        ));
        assert_eq!(invoker.calls(), 1);
        assert_eq!(
            std::fs::read_to_string(store.result_path("a")).expect("read"),
            "{}"
        );
    }
}
