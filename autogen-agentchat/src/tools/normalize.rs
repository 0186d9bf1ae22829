//! Output normalization: raw tool payloads to bounded observations.
//!
//! An [`Observation`] is what the model sees of a tool result. Its size is
//! bounded by [`NormalizerConfig`], structured payloads can be narrowed to
//! the fields a participant declared interest in, and binary payloads are
//! replaced by a reference and a one-line description.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::descriptor::OutputKind;
use crate::policy::ErrorKind;

/// Bounds applied to observations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub max_text_chars: usize,
    pub max_structured_chars: usize,
    pub max_fields: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_text_chars: 4000,
            max_structured_chars: 2000,
            max_fields: 50,
        }
    }
}

/// Model-facing rendering of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub kind: OutputKind,
    pub content: String,
    pub truncated: bool,
    /// Retrievable id for binary outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default)]
    pub is_error: bool,
}

const INLINE_DATA_FIELDS: [&str; 4] = ["data", "bytes", "base64", "content"];
const REFERENCE_FIELDS: [&str; 4] = ["reference", "ref", "id", "url"];
/// Room kept for the truncation marker line
const MARKER_RESERVE: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct OutputNormalizer {
    config: NormalizerConfig,
}

impl OutputNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize a successful payload.
    ///
    /// # Arguments
    /// * `kind` - The tool's declared output kind
    /// * `payload` - Raw payload returned by the tool
    /// * `interest` - Field paths the participant cares about; empty means everything
    pub fn normalize(&self, kind: OutputKind, payload: &Value, interest: &[String]) -> Observation {
        match kind {
            OutputKind::Text => self.text(payload),
            OutputKind::Structured => match payload {
                Value::Object(_) | Value::Array(_) => self.structured(payload, interest),
                _ => self.text(payload),
            },
            OutputKind::BinaryRef => self.binary(payload),
        }
    }

    /// Bounded description of a tool failure
    pub fn normalize_failure(&self, tool: &str, kind: ErrorKind, detail: &str) -> Observation {
        let (content, truncated) = truncate_chars(
            &format!("Tool '{}' failed ({}): {}", tool, kind, detail),
            self.config.max_text_chars,
        );
        Observation {
            kind: OutputKind::Text,
            content,
            truncated,
            reference: None,
            is_error: true,
        }
    }

    fn text(&self, payload: &Value) -> Observation {
        let rendered = match payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let (content, truncated) = truncate_chars(&rendered, self.config.max_text_chars);
        Observation {
            kind: OutputKind::Text,
            content,
            truncated,
            reference: None,
            is_error: false,
        }
    }

    fn structured(&self, payload: &Value, interest: &[String]) -> Observation {
        let mut fields = Vec::new();
        flatten("", payload, &mut fields);
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        let total = fields.len();
        let mut header = Vec::new();
        if !interest.is_empty() {
            fields.retain(|(path, _)| interest.iter().any(|prefix| path_matches(path, prefix)));
            if fields.is_empty() {
                header.push(format!(
                    "No fields matched [{}]; available keys: {}",
                    interest.join(", "),
                    top_level_keys(payload).join(", ")
                ));
            }
        }

        let lines: Vec<String> = fields.iter().map(|(path, value)| format!("{}: {}", path, value)).collect();
        let full: Vec<String> = header.iter().cloned().chain(lines.iter().cloned()).collect();
        let joined = full.join("\n");
        if lines.len() <= self.config.max_fields && joined.chars().count() <= self.config.max_structured_chars {
            return Observation {
                kind: OutputKind::Structured,
                content: joined,
                truncated: false,
                reference: None,
                is_error: false,
            };
        }

        let mut summary = vec![
            format!("{} fields ({} selected)", total, lines.len()),
            format!("top-level keys: {}", top_level_keys(payload).join(", ")),
        ];
        let mut used: usize = summary.iter().map(|l| l.chars().count() + 1).sum();
        let mut shown = 0;
        for line in &lines {
            if shown >= self.config.max_fields {
                break;
            }
            let cost = line.chars().count() + 1;
            if used + cost + MARKER_RESERVE > self.config.max_structured_chars {
                continue;
            }
            summary.push(line.clone());
            used += cost;
            shown += 1;
        }
        summary.push(format!("...[truncated {} fields]", lines.len() - shown));

        let (content, _) = truncate_chars(&summary.join("\n"), self.config.max_structured_chars.max(64));
        Observation {
            kind: OutputKind::Structured,
            content,
            truncated: true,
            reference: None,
            is_error: false,
        }
    }

    fn binary(&self, payload: &Value) -> Observation {
        let (reference, meta) = match payload {
            Value::String(s) if !s.trim().is_empty() => (Some(s.clone()), Map::new()),
            Value::Object(map) => {
                let reference = REFERENCE_FIELDS
                    .iter()
                    .find_map(|key| map.get(*key).and_then(Value::as_str))
                    .map(str::to_string);
                let meta: Map<String, Value> = map
                    .iter()
                    .filter(|(k, _)| !INLINE_DATA_FIELDS.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                (reference, meta)
            }
            _ => (None, Map::new()),
        };

        let description = meta
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("binary output");
        let mut details = Vec::new();
        if let Some(mime) = meta.get("mime_type").and_then(Value::as_str) {
            details.push(mime.to_string());
        }
        if let Some(size) = meta.get("size_bytes").and_then(Value::as_u64) {
            details.push(format!("{} bytes", size));
        }
        let mut content = format!("[binary] {}", description);
        if !details.is_empty() {
            content.push_str(&format!(" ({})", details.join(", ")));
        }
        match &reference {
            Some(r) => content.push_str(&format!(" ref={}", r)),
            None => content.push_str(" - no retrievable reference was provided"),
        }
        let (content, truncated) = truncate_chars(&content, self.config.max_text_chars);

        Observation {
            kind: OutputKind::BinaryRef,
            content,
            truncated,
            reference,
            is_error: false,
        }
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten(&join(key), child, out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten(&join(&index.to_string()), child, out);
            }
        }
        Value::String(s) => out.push((prefix.to_string(), s.clone())),
        other => out.push((prefix.to_string(), other.to_string())),
    }
}

fn path_matches(path: &str, prefix: &str) -> bool {
    path == prefix || (path.starts_with(prefix) && path[prefix.len()..].starts_with('.'))
}

fn top_level_keys(payload: &Value) -> Vec<String> {
    match payload {
        Value::Object(map) => {
            let mut keys: Vec<String> = map.keys().cloned().collect();
            keys.sort();
            keys
        }
        Value::Array(items) => vec![format!("[{} items]", items.len())],
        _ => Vec::new(),
    }
}

/// Cut `text` to at most `max` chars plus a marker naming how many were dropped
fn truncate_chars(text: &str, max: usize) -> (String, bool) {
    let total = text.chars().count();
    if total <= max {
        return (text.to_string(), false);
    }
    let kept: String = text.chars().take(max).collect();
    (format!("{}...[truncated {} chars]", kept, total - max), true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalizer(max_text: usize, max_structured: usize, max_fields: usize) -> OutputNormalizer {
        OutputNormalizer::new(NormalizerConfig {
            max_text_chars: max_text,
            max_structured_chars: max_structured,
            max_fields,
        })
    }

    #[test]
    fn test_long_text_is_truncated_with_marker() {
        let text = "é".repeat(50);
        let obs = normalizer(10, 100, 10).normalize(OutputKind::Text, &json!(text), &[]);
        assert!(obs.truncated);
        assert!(obs.content.starts_with(&"é".repeat(10)));
        assert!(obs.content.ends_with("...[truncated 40 chars]"));
    }

    #[test]
    fn test_short_text_passes_through() {
        let obs = OutputNormalizer::default().normalize(OutputKind::Text, &json!("hello"), &[]);
        assert_eq!(obs.content, "hello");
        assert!(!obs.truncated);
    }

    #[test]
    fn test_structured_interest_filter() {
        let payload = json!({
            "temperature": {"value": 21.5, "unit": "C"},
            "humidity": 40,
            "station": {"id": "abc", "elevation": 12}
        });
        let interest = vec!["temperature".to_string(), "station.id".to_string()];
        let obs = OutputNormalizer::default().normalize(OutputKind::Structured, &payload, &interest);
        assert_eq!(
            obs.content,
            "station.id: abc\ntemperature.unit: C\ntemperature.value: 21.5"
        );
        assert!(!obs.content.contains("humidity"));
    }

    #[test]
    fn test_structured_interest_prefix_is_path_aware() {
        let payload = json!({"temp": 1, "temperature": 2});
        let obs = OutputNormalizer::default().normalize(OutputKind::Structured, &payload, &["temp".to_string()]);
        assert_eq!(obs.content, "temp: 1");
    }

    #[test]
    fn test_structured_no_match_lists_keys() {
        let payload = json!({"a": 1, "b": 2});
        let obs = OutputNormalizer::default().normalize(OutputKind::Structured, &payload, &["zzz".to_string()]);
        assert!(obs.content.contains("available keys: a, b"));
    }

    #[test]
    fn test_large_structured_payload_is_summarized() {
        let items: Vec<Value> = (0..100).map(|i| json!({"id": i, "name": format!("item-{}", i)})).collect();
        let payload = json!({"items": items, "total": 100});
        let norm = normalizer(4000, 500, 20);
        let obs = norm.normalize(OutputKind::Structured, &payload, &[]);
        assert!(obs.truncated);
        assert!(obs.content.starts_with("201 fields"));
        assert!(obs.content.contains("top-level keys: items, total"));
        assert!(obs.content.contains("...[truncated"));
        assert!(obs.content.chars().count() <= 500);
    }

    #[test]
    fn test_oversized_field_does_not_hide_later_fields() {
        let payload = json!({"a": "x".repeat(500), "b": 1, "c": 2});
        let obs = normalizer(4000, 200, 10).normalize(OutputKind::Structured, &payload, &[]);
        assert!(obs.truncated);
        assert!(!obs.content.contains("a: x"));
        assert!(obs.content.contains("b: 1"));
        assert!(obs.content.contains("c: 2"));
        assert!(obs.content.ends_with("...[truncated 1 fields]"));
    }

    #[test]
    fn test_scalar_structured_payload_treated_as_text() {
        let obs = OutputNormalizer::default().normalize(OutputKind::Structured, &json!(144), &[]);
        assert_eq!(obs.kind, OutputKind::Text);
        assert_eq!(obs.content, "144");
    }

    #[test]
    fn test_binary_payload_is_referenced_not_inlined() {
        let payload = json!({
            "reference": "blob://chart-17",
            "description": "Sales chart",
            "mime_type": "image/png",
            "size_bytes": 20480,
            "data": "iVBORw0KGgoAAAANSUhEUgAA"
        });
        let obs = OutputNormalizer::default().normalize(OutputKind::BinaryRef, &payload, &[]);
        assert_eq!(obs.reference.as_deref(), Some("blob://chart-17"));
        assert_eq!(obs.content, "[binary] Sales chart (image/png, 20480 bytes) ref=blob://chart-17");
        assert!(!obs.content.contains("iVBOR"));
    }

    #[test]
    fn test_binary_without_reference() {
        let obs = OutputNormalizer::default().normalize(OutputKind::BinaryRef, &json!({"data": "AAAA"}), &[]);
        assert!(obs.reference.is_none());
        assert!(obs.content.contains("no retrievable reference"));
    }

    #[test]
    fn test_normalization_is_deterministic() {
        let payload = json!({"z": [1, 2, {"k": "v"}], "a": {"b": null}});
        let norm = OutputNormalizer::default();
        let first = norm.normalize(OutputKind::Structured, &payload, &[]);
        let second = norm.normalize(OutputKind::Structured, &payload, &[]);
        assert_eq!(first, second);
        assert_eq!(first.content, "a.b: null\nz.0: 1\nz.1: 2\nz.2.k: v");
    }

    #[test]
    fn test_failure_observation() {
        let obs = OutputNormalizer::default().normalize_failure("search", ErrorKind::Timeout, "no answer");
        assert!(obs.is_error);
        assert_eq!(obs.content, "Tool 'search' failed (timeout): no answer");
    }
}
