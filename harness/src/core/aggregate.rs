//! Suite statistics and ranked themes over a set of test results.

use std::collections::HashSet;

use crate::core::themes::{ThemeCollector, ThemeOptions};
use crate::core::types::{AggregateSummary, FailedTestDetail, TestResult};

/// Summarize `results`. Pure: the same input always yields the same summary.
///
/// Results sharing a `test_id` are counted once; the first occurrence wins.
pub fn aggregate(results: &[TestResult], options: &ThemeOptions) -> AggregateSummary {
    let mut seen = HashSet::new();
    let unique: Vec<&TestResult> = results
        .iter()
        .filter(|result| seen.insert(result.test_id.as_str()))
        .collect();

    let total = unique.len();
    let passed = unique.iter().filter(|result| result.success).count();
    let total_cost_usd: f64 = unique.iter().map(|result| result.total_cost_usd).sum();
    let total_duration_seconds: f64 = unique.iter().map(|result| result.duration_seconds).sum();
    let total_turns: u64 = unique
        .iter()
        .filter_map(|result| result.turn1.as_ref())
        .map(|turn| u64::from(turn.num_turns))
        .sum();

    let mut collector = ThemeCollector::new(*options);
    for result in &unique {
        if let Some(reflection) = &result.turn2_reflection {
            collector.add_reflection(&result.test_id, reflection);
        }
    }

    let failed_test_details = unique
        .iter()
        .filter(|result| !result.success)
        .map(|result| FailedTestDetail {
            test_id: result.test_id.clone(),
            prompt: result.prompt.clone(),
            error: result.error.clone(),
        })
        .collect();

    AggregateSummary {
        total,
        passed,
        failed: total - passed,
        success_rate: ratio(passed as f64, total),
        total_cost_usd,
        total_duration_seconds,
        avg_turns_per_test: ratio(total_turns as f64, total),
        avg_cost_per_test: ratio(total_cost_usd, total),
        avg_duration_per_test: ratio(total_duration_seconds, total),
        themes: collector.into_ranked(),
        failed_test_details,
    }
}

fn ratio(value: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { value / count as f64 }
}
