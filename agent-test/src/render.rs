//! Markdown report and console formatting for aggregate summaries.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use harness::core::types::{ErrorInfo, Theme, ThemeCategory};
use harness::io::store::SummaryDocument;

const REPORT_TEMPLATE: &str = include_str!("templates/report.md");

/// Section order in the report.
const SECTIONS: &[(ThemeCategory, &str)] = &[
    (ThemeCategory::ImprovementSuggestions, "Improvement Suggestions"),
    (ThemeCategory::WhatDidntWork, "What Didn't Work"),
    (ThemeCategory::WhatWorked, "What Worked Well"),
];

#[derive(Debug, Serialize)]
struct FailedView<'a> {
    test_id: &'a str,
    prompt: &'a str,
    error: String,
}

#[derive(Debug, Serialize)]
struct ThemeView<'a> {
    label: &'a str,
    frequency: usize,
    contributors: String,
    /// Phrasings other than the label.
    variants: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct SectionView<'a> {
    title: &'a str,
    themes: Vec<ThemeView<'a>>,
}

/// Render `aggregate-report.md`.
pub fn render_report(document: &SummaryDocument) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("report", REPORT_TEMPLATE)
        .context("load report template")?;
    let template = env.get_template("report")?;
    let summary = &document.summary;

    let failed_tests: Vec<FailedView<'_>> = summary
        .failed_test_details
        .iter()
        .map(|detail| FailedView {
            test_id: &detail.test_id,
            prompt: detail.prompt.trim(),
            error: describe_error(detail.error.as_ref()),
        })
        .collect();
    let sections: Vec<SectionView<'_>> = SECTIONS
        .iter()
        .map(|(category, title)| SectionView {
            title,
            themes: summary
                .themes
                .iter()
                .filter(|theme| theme.category == *category)
                .map(theme_view)
                .collect(),
        })
        .filter(|section| !section.themes.is_empty())
        .collect();

    let rendered = template
        .render(context! {
            suite_name => document.suite_name,
            generated_at => document.generated_at,
            results_dir => document.results_dir.display().to_string(),
            total => summary.total,
            passed => summary.passed,
            failed => summary.failed,
            success_pct => (summary.success_rate * 100.0).round() as u64,
            total_cost => format_cost(summary.total_cost_usd),
            total_duration => format_duration(summary.total_duration_seconds),
            avg_cost => format_cost(summary.avg_cost_per_test),
            avg_duration => format_duration(summary.avg_duration_per_test),
            avg_turns => format!("{:.1}", summary.avg_turns_per_test),
            failed_tests => failed_tests,
            sections => sections,
            warnings => document.warnings,
        })
        .context("render report")?;
    Ok(rendered)
}

fn theme_view(theme: &Theme) -> ThemeView<'_> {
    ThemeView {
        label: &theme.label,
        frequency: theme.frequency,
        contributors: theme.contributors.join(", "),
        variants: theme
            .suggestions
            .iter()
            .map(String::as_str)
            .filter(|variant| *variant != theme.label)
            .collect(),
    }
}

/// `timeout (turn 1): ...`, or `unknown` when no error was recorded.
pub fn describe_error(error: Option<&ErrorInfo>) -> String {
    match error {
        Some(error) if error.turn == 0 => format!("{}: {}", error.kind.as_str(), error.message),
        Some(error) => format!(
            "{} (turn {}): {}",
            error.kind.as_str(),
            error.turn,
            error.message
        ),
        None => "unknown".to_string(),
    }
}

pub fn format_cost(cost: f64) -> String {
    format!("${cost:.2}")
}

/// `42s`, `3m`, or `15m 32s`.
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        return format!("{seconds:.0}s");
    }
    let whole = seconds as u64;
    let (minutes, secs) = (whole / 60, whole % 60);
    if secs == 0 {
        format!("{minutes}m")
    } else {
        format!("{minutes}m {secs}s")
    }
}
