//! Lexical cue table for recovering reflection items from prose.
//!
//! Two kinds of rules:
//!
//! - **Headings** ("What Worked:", "**Improvements**") switch the current
//!   section; following lines belong to that category until the next heading.
//!   A Markdown heading that matches no rule ends the current section.
//! - **Item cues** classify loose sentences outside any section. Rules are
//!   checked in table order and the first match wins, so the order encodes
//!   precedence (an imperative "Add ..." is a suggestion even if it mentions
//!   something missing).

use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

use crate::core::types::ReflectionData;

/// One of the four reflection arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectionField {
    ProcessSteps,
    WhatWorked,
    WhatDidntWork,
    ImprovementSuggestions,
}

impl ReflectionField {
    fn push(self, data: &mut ReflectionData, item: String) {
        match self {
            ReflectionField::ProcessSteps => data.process_steps.push(item),
            ReflectionField::WhatWorked => data.what_worked.push(item),
            ReflectionField::WhatDidntWork => data.what_didnt_work.push(item),
            ReflectionField::ImprovementSuggestions => data.improvement_suggestions.push(item),
        }
    }
}

const HEADINGS: &[(ReflectionField, &str)] = &[
    (
        ReflectionField::ProcessSteps,
        r"process(?:\s+steps)?|steps(?:\s+taken)?|what\s+i\s+did|approach",
    ),
    (
        ReflectionField::WhatWorked,
        r"what\s+worked(?:\s+well)?|what\s+helped|successes|positives",
    ),
    (
        ReflectionField::WhatDidntWork,
        r"what\s+did(?:n['’]t|\s+not)\s+work|challenges|difficulties|pain\s+points|issues|problems",
    ),
    (
        ReflectionField::ImprovementSuggestions,
        r"improvement\s+suggestions|improvements?|suggestions|recommendations|next\s+steps",
    ),
];

const ITEM_CUES: &[(ReflectionField, &str)] = &[
    (
        ReflectionField::ImprovementSuggestions,
        r"^(?:add|include|provide|document|clarify|consider|create|expand|improve|update|rename|split|make)\b",
    ),
    (
        ReflectionField::WhatDidntWork,
        r"\b(?:could\s*n['’]?o?t|can['’]?t|cannot|confus\w*|unclear|difficult|hard\s+to|struggl\w*|inefficient|workarounds?|did(?:n['’]t|\s+not)\s+work|ambiguous|tedious)\b",
    ),
    (
        ReflectionField::ImprovementSuggestions,
        r"\b(?:should|could|would\s+(?:be|help|make)|recommend\w*|suggest\w*|it\s+would\s+be|would\s+benefit)\b",
    ),
    (
        ReflectionField::WhatWorked,
        r"\b(?:helped|helpful|worked\s+well|useful|straightforward|effective|made\s+it\s+easy|was\s+clear|were\s+clear|easy\s+to)\b",
    ),
    (
        ReflectionField::ProcessSteps,
        r"^(?:first|then|next|finally|after\s+that|i\s+(?:ran|read|searched|looked|opened|checked|used|started|reviewed|examined|listed|queried|found|wrote|created|explored))\b",
    ),
];

/// Compiled rule table: category -> cue phrases.
#[derive(Debug)]
pub struct CueTable {
    headings: Vec<(ReflectionField, Regex)>,
    items: Vec<(ReflectionField, Regex)>,
    bullet: Regex,
    markdown_heading: Regex,
}

impl CueTable {
    pub fn new() -> Result<Self> {
        let headings = HEADINGS
            .iter()
            .map(|(field, names)| {
                let pattern = format!(
                    r"^(?:\*\*|__)?\s*(?:{names})\s*(?P<c1>:)?\s*(?:\*\*|__)?\s*(?P<c2>:)?\s*(?P<rest>.*)$"
                );
                compile(&pattern).map(|re| (*field, re))
            })
            .collect::<Result<Vec<_>>>()?;
        let items = ITEM_CUES
            .iter()
            .map(|(field, pattern)| compile(pattern).map(|re| (*field, re)))
            .collect::<Result<Vec<_>>>()?;
        let bullet = compile(r"^\s*(?:#+\s*|[-*•+]\s+|\d+[.)]\s+)*")?;
        // `## Title`, or a line that is nothing but bold text.
        let markdown_heading =
            compile(r"^\s*(?:#{1,6}\s|(?:\*\*|__)[^*_]+(?:\*\*|__)\s*:?\s*$)")?;
        Ok(Self {
            headings,
            items,
            bullet,
            markdown_heading,
        })
    }

    /// Best-effort extraction. Never fails; may return empty arrays.
    pub fn extract(&self, text: &str) -> ReflectionData {
        let mut data = ReflectionData::default();
        let mut section: Option<ReflectionField> = None;

        for raw in text.lines() {
            let line = self.strip_marker(raw);
            if line.is_empty() {
                continue;
            }
            if let Some((field, rest)) = self.heading(line) {
                section = Some(field);
                if let Some(item) = clean_item(rest) {
                    field.push(&mut data, item);
                }
                continue;
            }
            if self.markdown_heading.is_match(raw) {
                section = None;
                continue;
            }
            match section {
                Some(field) => {
                    if let Some(item) = clean_item(line) {
                        field.push(&mut data, item);
                    }
                }
                None => {
                    for sentence in split_sentences(line) {
                        if let Some(item) = clean_item(sentence)
                            && let Some(field) = self.classify(&item)
                        {
                            field.push(&mut data, item);
                        }
                    }
                }
            }
        }
        data
    }

    /// Category of a loose sentence, if any cue matches.
    pub fn classify(&self, item: &str) -> Option<ReflectionField> {
        self.items
            .iter()
            .find(|(_, re)| re.is_match(item))
            .map(|(field, _)| *field)
    }

    fn heading<'t>(&self, line: &'t str) -> Option<(ReflectionField, &'t str)> {
        for (field, re) in &self.headings {
            let Some(caps) = re.captures(line) else {
                continue;
            };
            let rest = caps.name("rest").map_or("", |m| m.as_str());
            let has_colon = caps.name("c1").is_some() || caps.name("c2").is_some();
            if has_colon || rest.trim().is_empty() {
                return Some((*field, rest));
            }
        }
        None
    }

    fn strip_marker<'t>(&self, line: &'t str) -> &'t str {
        let start = self.bullet.find(line).map_or(0, |m| m.end());
        line[start..].trim()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("compile cue pattern {pattern}"))
}

fn clean_item(text: &str) -> Option<String> {
    let trimmed = text
        .trim()
        .trim_matches(|ch: char| ch == '*' || ch == '_' || ch == '`')
        .trim();
    if trimmed.is_empty() || trimmed.chars().all(|ch| !ch.is_alphanumeric()) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Split a prose line after `.`, `!` or `?` followed by whitespace.
fn split_sentences(line: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = line.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?')
            && let Some((next_idx, next)) = chars.peek()
            && next.is_whitespace()
        {
            sentences.push(&line[start..=idx]);
            start = *next_idx + next.len_utf8();
        }
    }
    if start < line.len() {
        sentences.push(&line[start..]);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CueTable {
        CueTable::new().expect("cue table compiles")
    }

    #[test]
    fn headed_sections_collect_their_bullets() {
        let text = "\
## What Worked
- The schema docs were clear
## What Didn't Work
- Date formats were inconsistent
## Improvements
- Add date filtering examples
";
        let data = table().extract(text);
        assert_eq!(data.what_worked, vec!["The schema docs were clear"]);
        assert_eq!(data.what_didnt_work, vec!["Date formats were inconsistent"]);
        assert_eq!(data.improvement_suggestions, vec!["Add date filtering examples"]);
        assert!(!data.is_structured);
    }

    #[test]
    fn unknown_heading_closes_the_previous_section() {
        let text = "\
## Improvements
- Add date filtering examples
## Overall
The task went fine overall.
**Summary**
Nothing else to report.
";
        let data = table().extract(text);
        assert_eq!(data.improvement_suggestions, vec!["Add date filtering examples"]);
        assert!(data.what_worked.is_empty());
        assert!(data.what_didnt_work.is_empty());
        assert!(data.process_steps.is_empty());
    }

    #[test]
    fn prose_after_unknown_heading_is_still_classified() {
        let text = "\
## What Worked
- The examples
## Notes
The nested config was confusing.
";
        let data = table().extract(text);
        assert_eq!(data.what_worked, vec!["The examples"]);
        assert_eq!(data.what_didnt_work, vec!["The nested config was confusing."]);
    }

    #[test]
    fn numbered_bold_headings_with_inline_content() {
        let text = "\
1. **Process**: I read the README and queried the index.
2. **What Worked**: The examples helped.
3. **What Didn't Work**: Pagination was confusing.
4. **Improvements**: Document the pagination cursor.
";
        let data = table().extract(text);
        assert_eq!(data.process_steps, vec!["I read the README and queried the index."]);
        assert_eq!(data.what_worked, vec!["The examples helped."]);
        assert_eq!(data.what_didnt_work, vec!["Pagination was confusing."]);
        assert_eq!(
            data.improvement_suggestions,
            vec!["Document the pagination cursor."]
        );
    }

    #[test]
    fn loose_prose_is_classified_by_cues() {
        let text = "Overall it went fine. The field reference was helpful. \
The nested config was confusing. It would be better to include a worked example.";
        let data = table().extract(text);
        assert_eq!(data.what_worked, vec!["The field reference was helpful."]);
        assert_eq!(data.what_didnt_work, vec!["The nested config was confusing."]);
        assert_eq!(
            data.improvement_suggestions,
            vec!["It would be better to include a worked example."]
        );
    }

    #[test]
    fn imperative_beats_difficulty_cue() {
        assert_eq!(
            table().classify("Add the missing date examples"),
            Some(ReflectionField::ImprovementSuggestions)
        );
        assert_eq!(
            table().classify("I could not find the date examples"),
            Some(ReflectionField::WhatDidntWork)
        );
    }

    #[test]
    fn prose_without_heading_words_is_not_a_heading() {
        let data = table().extract("Process the queue before reading.");
        assert!(data.process_steps.is_empty());
    }

    #[test]
    fn unmatched_text_yields_empty_data() {
        let data = table().extract("Sure.\n\n---\n");
        assert!(data.is_empty());
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        assert_eq!(
            split_sentences("One. Two! Three? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
        assert_eq!(split_sentences("v1.2 is out"), vec!["v1.2 is out"]);
    }
}
