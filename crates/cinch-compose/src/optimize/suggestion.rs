//! Suggestion payload types and validation of provider replies.

use crate::error::{ComposeError, Result};
use crate::json_schema_for;
use crate::resolve::Section;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, trace};

#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Remove,
    Simplify,
    Merge,
    Restructure,
}

impl SuggestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionKind::Remove => "remove",
            SuggestionKind::Simplify => "simplify",
            SuggestionKind::Merge => "merge",
            SuggestionKind::Restructure => "restructure",
        }
    }
}

impl std::fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        })
    }
}

/// One proposed change to one section.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct Suggestion {
    /// `[index]` of the target section.
    pub section_index: usize,
    pub kind: SuggestionKind,
    pub priority: Priority,
    /// Why the section should change.
    pub issue: String,
    /// New section text. Required for every kind except `remove`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_token_savings: Option<u32>,
}

impl Suggestion {
    /// Text the target section has once this suggestion is applied.
    pub fn resulting_text(&self) -> &str {
        match self.kind {
            SuggestionKind::Remove => "",
            _ => self.replacement.as_deref().unwrap_or(""),
        }
    }
}

/// Shape the provider must reply with.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq, Eq)]
pub struct SuggestionPayload {
    /// One or two sentences on the prompt as a whole.
    pub summary: String,
    pub suggestions: Vec<Suggestion>,
}

/// JSON Schema for [`SuggestionPayload`].
pub fn payload_schema() -> serde_json::Value {
    json_schema_for::<SuggestionPayload>()
}

/// Locate the JSON object in a reply that may be wrapped in a code fence or
/// surrounded by prose.
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    trimmed.get(start..=end)
}

/// Parse and check a provider reply against the sections it was asked
/// about.
///
/// Rejects the whole payload on the first problem: unparseable JSON, a
/// schema violation, an index naming no enabled section, a non-remove
/// suggestion without replacement text, or two suggestions for one section.
pub fn parse_suggestions(raw: &str, sections: &[Section]) -> Result<SuggestionPayload> {
    trace!("Optimizer reply ({} bytes)", raw.len());
    let malformed = ComposeError::MalformedSuggestions;

    let json = extract_json(raw).ok_or_else(|| malformed("no JSON object in reply".into()))?;
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| malformed(format!("invalid JSON: {e}")))?;

    let schema = payload_schema();
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| malformed(format!("invalid payload schema: {e}")))?;
    let errors: Vec<String> = validator
        .iter_errors(&value)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();
    if !errors.is_empty() {
        return Err(malformed(format!(
            "schema validation failed: {}",
            errors.join("; ")
        )));
    }

    let payload: SuggestionPayload =
        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

    let mut seen = HashSet::new();
    for suggestion in &payload.suggestions {
        let index = suggestion.section_index;
        let section = sections
            .iter()
            .find(|s| s.index == index)
            .ok_or_else(|| malformed(format!("section index {index} out of range")))?;
        if !section.enabled {
            return Err(malformed(format!(
                "section {index} ({}) is empty and cannot be changed",
                section.id
            )));
        }
        if suggestion.kind != SuggestionKind::Remove
            && suggestion
                .replacement
                .as_deref()
                .is_none_or(|r| r.trim().is_empty())
        {
            return Err(malformed(format!(
                "{} suggestion for section {index} has no replacement",
                suggestion.kind
            )));
        }
        if !seen.insert(index) {
            return Err(malformed(format!("more than one suggestion for section {index}")));
        }
    }

    debug!(
        "Accepted {} suggestion(s) over {} section(s)",
        payload.suggestions.len(),
        sections.len()
    );
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::SectionKind;
    use serde_json::json;

    fn sections() -> Vec<Section> {
        ["You are an assistant.", "", "Be concise. Be brief. Be short."]
            .iter()
            .enumerate()
            .map(|(index, text)| Section {
                index,
                id: format!("b{index}"),
                title: format!("B{index}"),
                kind: SectionKind::Block,
                text: (*text).into(),
                enabled: !text.is_empty(),
            })
            .collect()
    }

    fn reply(suggestions: serde_json::Value) -> String {
        json!({"summary": "Slightly redundant.", "suggestions": suggestions}).to_string()
    }

    #[test]
    fn accepts_valid_payload() {
        let raw = reply(json!([
            {"section_index": 2, "kind": "simplify", "priority": "high",
             "issue": "Says the same thing three times.", "replacement": "Be concise.",
             "estimated_token_savings": 5},
            {"section_index": 0, "kind": "remove", "priority": "low", "issue": "Generic."}
        ]));
        let payload = parse_suggestions(&raw, &sections()).unwrap();
        assert_eq!(payload.suggestions.len(), 2);
        assert_eq!(payload.suggestions[0].resulting_text(), "Be concise.");
        assert_eq!(payload.suggestions[1].resulting_text(), "");
    }

    #[test]
    fn accepts_fenced_reply() {
        let raw = format!("Here you go:\n```json\n{}\n```", reply(json!([])));
        let payload = parse_suggestions(&raw, &sections()).unwrap();
        assert!(payload.suggestions.is_empty());
        assert_eq!(payload.summary, "Slightly redundant.");
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_suggestions("I could not find anything.", &sections()).unwrap_err();
        assert!(matches!(err, ComposeError::MalformedSuggestions(_)));
    }

    #[test]
    fn rejects_unknown_kind_via_schema() {
        let raw = reply(json!([
            {"section_index": 0, "kind": "rewrite", "priority": "high", "issue": "x",
             "replacement": "y"}
        ]));
        let err = parse_suggestions(&raw, &sections()).unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let raw = reply(json!([
            {"section_index": 9, "kind": "remove", "priority": "low", "issue": "x"}
        ]));
        assert!(parse_suggestions(&raw, &sections()).is_err());
    }

    #[test]
    fn rejects_disabled_target() {
        let raw = reply(json!([
            {"section_index": 1, "kind": "remove", "priority": "low", "issue": "x"}
        ]));
        let err = parse_suggestions(&raw, &sections()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn rejects_missing_replacement() {
        let raw = reply(json!([
            {"section_index": 2, "kind": "merge", "priority": "medium", "issue": "x"}
        ]));
        let err = parse_suggestions(&raw, &sections()).unwrap_err();
        assert!(err.to_string().contains("no replacement"));
    }

    #[test]
    fn rejects_duplicate_targets() {
        let raw = reply(json!([
            {"section_index": 2, "kind": "remove", "priority": "low", "issue": "x"},
            {"section_index": 2, "kind": "simplify", "priority": "low", "issue": "y",
             "replacement": "z"}
        ]));
        let err = parse_suggestions(&raw, &sections()).unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn schema_requires_summary_and_suggestions() {
        let schema = payload_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&"summary".into()));
        assert!(required.contains(&"suggestions".into()));
    }
}
