//! Grouping of reflection items into themes.
//!
//! Items are normalized (lowercase, punctuation and list markers dropped,
//! whitespace collapsed) and compared within their category. Two items belong
//! to the same theme when their normalized forms are equal or their token
//! sets overlap by at least [`ThemeOptions::similarity`] (Jaccard index).
//! Before comparing, articles are dropped and simple plurals folded, so
//! "add examples" and "add an example" count as the same phrasing.

use std::collections::BTreeSet;

use crate::core::types::{ReflectionData, Theme, ThemeCategory};

pub const DEFAULT_THEME_SIMILARITY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemeOptions {
    /// Jaccard threshold in `(0, 1]`. `1.0` groups only identical token sets.
    pub similarity: f64,
}

impl Default for ThemeOptions {
    fn default() -> Self {
        Self {
            similarity: DEFAULT_THEME_SIMILARITY,
        }
    }
}

/// Lowercase, strip list markers and punctuation, collapse whitespace.
pub fn normalize(item: &str) -> String {
    let lowered = item.trim().to_lowercase();
    strip_list_marker(&lowered)
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch.is_whitespace() {
                ch
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_list_marker(text: &str) -> &str {
    let rest = text.trim_start_matches(|ch: char| ch.is_ascii_digit());
    if rest.len() == text.len() {
        return text;
    }
    match rest.strip_prefix(['.', ')']) {
        Some(after) if after.starts_with(char::is_whitespace) => after,
        _ => text,
    }
}

const ARTICLES: &[&str] = &["a", "an", "the"];

/// Jaccard index of the two normalized strings' folded token sets.
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = comparison_tokens(a);
    let right = comparison_tokens(b);
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    shared as f64 / union as f64
}

fn comparison_tokens(key: &str) -> BTreeSet<String> {
    key.split_whitespace()
        .filter(|token| !ARTICLES.contains(token))
        .map(fold_plural)
        .collect()
}

/// `examples` -> `example`, `queries` -> `query`; short words and `-ss` stay.
fn fold_plural(token: &str) -> String {
    if token.len() <= 3 || token.ends_with("ss") {
        return token.to_string();
    }
    if let Some(stem) = token.strip_suffix("ies") {
        return format!("{stem}y");
    }
    token.strip_suffix('s').unwrap_or(token).to_string()
}

#[derive(Debug)]
struct Group {
    category: ThemeCategory,
    keys: Vec<String>,
    theme: Theme,
}

impl Group {
    fn matches(&self, key: &str, threshold: f64) -> bool {
        self.keys
            .iter()
            .any(|existing| existing == key || similarity(existing, key) >= threshold)
    }
}

/// Accumulates reflection items in encounter order.
#[derive(Debug)]
pub struct ThemeCollector {
    options: ThemeOptions,
    groups: Vec<Group>,
}

impl ThemeCollector {
    pub fn new(options: ThemeOptions) -> Self {
        Self {
            options,
            groups: Vec::new(),
        }
    }

    /// Add every themed item from one test's reflection.
    pub fn add_reflection(&mut self, test_id: &str, reflection: &ReflectionData) {
        let categories = [
            (ThemeCategory::WhatWorked, &reflection.what_worked),
            (ThemeCategory::WhatDidntWork, &reflection.what_didnt_work),
            (
                ThemeCategory::ImprovementSuggestions,
                &reflection.improvement_suggestions,
            ),
        ];
        for (category, items) in categories {
            for item in items {
                self.add(category, test_id, item);
            }
        }
    }

    pub fn add(&mut self, category: ThemeCategory, test_id: &str, item: &str) {
        let key = normalize(item);
        if key.is_empty() {
            return;
        }
        let phrasing = item.trim();
        let threshold = self.options.similarity;
        match self
            .groups
            .iter_mut()
            .find(|group| group.category == category && group.matches(&key, threshold))
        {
            Some(group) => {
                if !group.keys.contains(&key) {
                    group.keys.push(key);
                }
                if !group.theme.suggestions.iter().any(|s| s == phrasing) {
                    group.theme.suggestions.push(phrasing.to_string());
                }
                if !group.theme.contributors.iter().any(|id| id == test_id) {
                    group.theme.contributors.push(test_id.to_string());
                    group.theme.frequency = group.theme.contributors.len();
                }
            }
            None => self.groups.push(Group {
                category,
                keys: vec![key],
                theme: Theme {
                    category,
                    label: phrasing.to_string(),
                    suggestions: vec![phrasing.to_string()],
                    frequency: 1,
                    contributors: vec![test_id.to_string()],
                },
            }),
        }
    }

    /// Themes by descending frequency; ties keep first-encountered order.
    pub fn into_ranked(self) -> Vec<Theme> {
        let mut themes: Vec<Theme> = self.groups.into_iter().map(|group| group.theme).collect();
        themes.sort_by(|a, b| b.frequency.cmp(&a.frequency));
        themes
    }
}
