//! Turning free-form model output into typed, optional fields.
//!
//! Models wrap JSON in fences, prepend prose, or drift from the schema.
//! Extraction takes the outermost object; validation then goes field by
//! field so one bad field never discards the rest.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::models::{Complexity, Hint, HintLevel, Solution};
use crate::services::provider::ProviderError;

lazy_static! {
    static ref JSON_FENCE: Regex = Regex::new(r"(?is)```json(.*?)```").unwrap();
}

/// Stands in when the model returns corrected code without explaining it.
pub const UNEXPLAINED_SOLUTION: &str =
    "Compare this corrected version with your code line by line to spot the changes.";

/// Typed view of a provider reply. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderReply {
    pub summary: Option<String>,
    pub hints: Vec<Hint>,
    pub full_solution: Option<Solution>,
    pub key_concepts: Vec<String>,
    pub complexity: Option<Complexity>,
    pub best_practices: Vec<String>,
}

impl ProviderReply {
    /// A reply without a summary is not usable feedback.
    pub fn is_usable(&self) -> bool {
        self.summary.is_some()
    }
}

/// The outermost `{ ... }` of the text, preferring a ```json fence when
/// one is present.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let candidate = JSON_FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim();
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    (start < end).then(|| &candidate[start..=end])
}

pub fn parse_reply(raw: &str) -> Result<ProviderReply, ProviderError> {
    let fragment = extract_json_object(raw)
        .ok_or_else(|| ProviderError::Malformed("no JSON object in reply".to_string()))?;
    let value: Value =
        serde_json::from_str(fragment).map_err(|e| ProviderError::Malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ProviderError::Malformed("reply is not an object".to_string()))?;

    Ok(ProviderReply {
        summary: object.get("summary").and_then(non_empty_string),
        hints: object.get("hints").map(hints_from).unwrap_or_default(),
        full_solution: object.get("full_solution").and_then(solution_from),
        key_concepts: object.get("key_concepts").map(strings_from).unwrap_or_default(),
        complexity: object.get("complexity").and_then(complexity_from),
        best_practices: object
            .get("best_practices")
            .map(strings_from)
            .unwrap_or_default(),
    })
}

fn non_empty_string(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn strings_from(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(non_empty_string).collect())
        .unwrap_or_default()
}

fn hints_from(value: &Value) -> Vec<Hint> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let level = match item.get("level")? {
                Value::String(label) => HintLevel::from_label(label)?,
                Value::Number(n) => HintLevel::from_rank(u8::try_from(n.as_u64()?).ok()?)?,
                _ => return None,
            };
            let text = item.get("text").and_then(non_empty_string)?;
            Some(Hint { level, text })
        })
        .collect()
}

fn solution_from(value: &Value) -> Option<Solution> {
    let object = value.as_object()?;
    let code = object.get("code").and_then(non_empty_string);
    let explanation = object.get("explanation").and_then(non_empty_string);
    match (code, explanation) {
        (None, None) => None,
        (code, Some(explanation)) => Some(Solution { code, explanation }),
        (Some(code), None) => Some(Solution {
            code: Some(code),
            explanation: UNEXPLAINED_SOLUTION.to_string(),
        }),
    }
}

fn complexity_from(value: &Value) -> Option<Complexity> {
    Some(Complexity {
        time: value.get("time").and_then(non_empty_string)?,
        space: value.get("space").and_then(non_empty_string)?,
    })
}
