//! Merge-field templates. A placeholder is `{{identifier}}` where the
//! identifier is one or more word characters; anything else between braces
//! is left untouched as literal text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder pattern is valid"));

/// Caller-supplied values keyed by field name.
pub type MergeData = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// A template body split once into literal text and fields, so repeated
/// renders don't rescan the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
}

impl CompiledTemplate {
    pub fn compile(body: &str) -> Self {
        let mut segments = Vec::new();
        let mut cursor = 0;
        for captures in PLACEHOLDER.captures_iter(body) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > cursor {
                segments.push(Segment::Literal(body[cursor..whole.start()].to_string()));
            }
            segments.push(Segment::Field(name.as_str().to_string()));
            cursor = whole.end();
        }
        if cursor < body.len() {
            segments.push(Segment::Literal(body[cursor..].to_string()));
        }
        Self { segments }
    }

    /// Field names in first-seen order, without duplicates.
    pub fn fields(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for segment in &self.segments {
            if let Segment::Field(name) = segment {
                if !names.iter().any(|existing| existing == name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Substitutes every field. Missing keys and JSON nulls render as the
    /// empty string so partially filled drafts still render.
    pub fn render(&self, data: &MergeData) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => match data.get(name) {
                    None | Some(Value::Null) => {}
                    Some(Value::String(text)) => out.push_str(text),
                    Some(other) => out.push_str(&other.to_string()),
                },
            }
        }
        out
    }
}

pub fn extract_fields(body: &str) -> Vec<String> {
    CompiledTemplate::compile(body).fields()
}

pub fn render(body: &str, data: &MergeData) -> String {
    CompiledTemplate::compile(body).render(data)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn data(value: Value) -> MergeData {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn extracts_fields_in_order() {
        let fields = extract_fields("Dear {{client_name}}, fee is {{fee_amount}}");
        assert_eq!(fields, vec!["client_name", "fee_amount"]);
    }

    #[test]
    fn deduplicates_repeated_fields() {
        let fields = extract_fields("{{a}} {{b}} {{a}} {{c}} {{b}}");
        assert_eq!(fields, vec!["a", "b", "c"]);
    }

    #[test]
    fn renders_all_placeholders() {
        let body = "Dear {{client_name}}, fee is {{fee_amount}}";
        let rendered = render(
            body,
            &data(json!({ "client_name": "Acme", "fee_amount": "R500" })),
        );
        assert_eq!(rendered, "Dear Acme, fee is R500");
        assert!(!rendered.contains("{{"));
        assert!(!rendered.contains("}}"));
    }

    #[test]
    fn missing_keys_render_empty() {
        let rendered = render("Hi {{name}}!", &MergeData::new());
        assert_eq!(rendered, "Hi !");
    }

    #[test]
    fn non_string_values_use_json_text() {
        let rendered = render(
            "{{count}} items, vat {{vat}}, note {{note}}",
            &data(json!({ "count": 3, "vat": true, "note": null })),
        );
        assert_eq!(rendered, "3 items, vat true, note ");
    }

    #[test]
    fn leaves_malformed_braces_alone() {
        let body = "{{ spaced }} and {{dash-name}} and {single}";
        assert!(extract_fields(body).is_empty());
        assert_eq!(render(body, &MergeData::new()), body);
    }

    #[test]
    fn body_without_fields_round_trips() {
        let compiled = CompiledTemplate::compile("plain text");
        assert!(compiled.fields().is_empty());
        assert_eq!(compiled.render(&MergeData::new()), "plain text");
    }

    #[test]
    fn adjacent_placeholders() {
        let rendered = render("{{a}}{{b}}", &data(json!({ "a": "x", "b": "y" })));
        assert_eq!(rendered, "xy");
    }
}
