//! Turn-2 reflection prompt and response extraction.

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use serde_json::Value;
use tracing::debug;

use crate::core::cues::CueTable;
use crate::core::types::ReflectionData;

const REFLECTION_SCHEMA: &str = include_str!("../../schemas/reflection.schema.json");

/// Sent verbatim as the turn-2 prompt, resuming the turn-1 session.
pub const REFLECTION_PROMPT: &str = "\
Now that you've completed the task, please reflect on your process:

1. **Process**: What steps did you take to answer this question?
2. **What Worked**: What aspects of the skill, data structure, or instructions helped you succeed?
3. **What Didn't Work**: What was confusing, inefficient, or required workarounds?
4. **Improvements**: How could the skill, data structure, or instructions be improved to make this easier?

Respond in JSON format with keys: process_steps, what_worked, what_didnt_work, improvement_suggestions (all arrays of strings).";

/// Turns a reflection response into [`ReflectionData`].
///
/// Structured parsing is tried first (the whole text, then the outermost
/// `{...}` span inside it). Anything else goes through the cue table.
/// Extraction never fails.
#[derive(Debug)]
pub struct ReflectionExtractor {
    schema: Validator,
    cues: CueTable,
}

impl ReflectionExtractor {
    pub fn new() -> Result<Self> {
        let schema_json: Value =
            serde_json::from_str(REFLECTION_SCHEMA).context("parse reflection schema")?;
        let schema = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema_json)
            .context("compile reflection schema")?;
        Ok(Self {
            schema,
            cues: CueTable::new()?,
        })
    }

    pub fn extract(&self, text: Option<&str>) -> ReflectionData {
        let Some(text) = text.map(str::trim).filter(|text| !text.is_empty()) else {
            return ReflectionData::default();
        };
        let body = strip_code_fence(text);
        if let Some(data) = self.parse_structured(body) {
            return data;
        }
        if let Some(span) = embedded_object(body)
            && let Some(data) = self.parse_structured(span)
        {
            debug!("structured reflection found inside prose");
            return data;
        }
        debug!(bytes = body.len(), "falling back to heuristic reflection extraction");
        let mut data = self.cues.extract(body);
        data.is_structured = false;
        data
    }

    fn parse_structured(&self, text: &str) -> Option<ReflectionData> {
        let value: Value = serde_json::from_str(text).ok()?;
        if !self.schema.is_valid(&value) {
            debug!("reflection json does not match schema");
            return None;
        }
        let mut data: ReflectionData = serde_json::from_value(value).ok()?;
        data.is_structured = true;
        Some(data)
    }
}

/// Return the contents of a surrounding Markdown code fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(first_newline) = after_open.find('\n') else {
        return trimmed;
    };
    let inner = &after_open[first_newline + 1..];
    match inner.rfind("```") {
        Some(close) if inner[close..].trim() == "```" => inner[..close].trim(),
        _ => trimmed,
    }
}

fn embedded_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
