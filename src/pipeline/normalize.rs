//! Response normalisation: arbitrary backend body → one [`ExtractionOutcome`].
//!
//! The OCR endpoint normally answers `{"pages":[{"markdown":…}]}`, but older
//! deployments, proxies and the chat fallback all produce different shapes.
//! Rather than nesting conditionals, the known shapes are an ordered list of
//! pure `&Value → Option<String>` rules ([`RULES`]); the first rule that
//! yields non-blank text wins. Reordering or adding a shape is a data change.
//!
//! ## Decision order
//!
//! 1. Not JSON: short plain text is accepted as-is, anything else is a
//!    parse failure with a truncated preview.
//! 2. Chat bodies are first repackaged into the pages shape.
//! 3. [`RULES`] in order: `pages` → `text` → `elements` → `content`.
//! 4. Nothing matched and the body signals an error: escalate (direct OCR)
//!    or fail (document understanding, which never escalates).
//! 5. A known shape (`pages`, `elements`, or chat `choices`) was present but
//!    blank: no text found. Its metadata is never passed off as text.
//! 6. Last resort, for shapes no rule knows: walk every string leaf into a
//!    `path: value` dump.
//! 7. Still nothing: unrecognised format.
//!
//! [`normalize`] is a pure function of its inputs.

use crate::config::EscalationScope;
use crate::error::{truncate, ItemError};
use crate::output::{ExtractionOutcome, SourceFormat};
use crate::pipeline::request::Attempt;
use serde_json::{json, Value};

/// Non-JSON bodies shorter than this are treated as plain extracted text.
pub const PLAIN_TEXT_MAX_BYTES: usize = 1000;
/// Preview length for unparseable bodies.
pub const PARSE_PREVIEW_CHARS: usize = 200;

/// A named extraction rule.
pub type Rule = (SourceFormat, fn(&Value) -> Option<String>);

/// Extraction rules in priority order.
pub const RULES: &[Rule] = &[
    (SourceFormat::Markdown, pages_markdown),
    (SourceFormat::Text, top_level_text),
    (SourceFormat::Elements, elements_text),
    (SourceFormat::Content, top_level_content),
];

/// Reduce a raw backend body to exactly one outcome.
pub fn normalize(raw: &str, attempt: Attempt, scope: EscalationScope) -> ExtractionOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ExtractionOutcome::Failure(ItemError::Parse {
            preview: "empty response from server".into(),
        });
    }

    let value: Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => return normalize_non_json(trimmed),
    };

    let is_chat = attempt == Attempt::DocumentUnderstanding && value.get("choices").is_some();
    let value = match attempt {
        Attempt::DocumentUnderstanding => repackage_chat(&value).unwrap_or(value),
        Attempt::DirectOcr => value,
    };

    if let Some((text, format)) = apply_rules(&value) {
        return ExtractionOutcome::success(text, format);
    }

    if signals_error(raw, &value, scope) {
        let message = error_message(&value).unwrap_or_else(|| truncate(trimmed, PARSE_PREVIEW_CHARS));
        return match attempt {
            Attempt::DirectOcr => ExtractionOutcome::Escalate { reason: message },
            Attempt::DocumentUnderstanding => ExtractionOutcome::Failure(ItemError::UpstreamLogical {
                message,
                raw: Some(raw.to_string()),
            }),
        };
    }

    if let Some(shape) = known_shape(&value, is_chat) {
        return ExtractionOutcome::Failure(ItemError::NoText {
            shape: shape.into(),
            raw: Some(raw.to_string()),
        });
    }

    let dump = walk_strings(&value);
    if !dump.trim().is_empty() {
        return ExtractionOutcome::success(dump, SourceFormat::Extracted);
    }

    ExtractionOutcome::Failure(unrecognized(raw))
}

/// Run [`RULES`] in order, returning the first non-blank hit.
pub fn apply_rules(value: &Value) -> Option<(String, SourceFormat)> {
    RULES.iter().find_map(|(format, rule)| {
        rule(value)
            .filter(|text| !text.trim().is_empty())
            .map(|text| (text, *format))
    })
}

fn normalize_non_json(trimmed: &str) -> ExtractionOutcome {
    let looks_structured = trimmed.starts_with('{') || trimmed.starts_with('[');
    if trimmed.len() < PLAIN_TEXT_MAX_BYTES && !looks_structured {
        return ExtractionOutcome::success(trimmed, SourceFormat::Text);
    }
    ExtractionOutcome::Failure(ItemError::Parse {
        preview: truncate(trimmed, PARSE_PREVIEW_CHARS),
    })
}

fn unrecognized(raw: &str) -> ItemError {
    ItemError::UnrecognizedShape {
        size: raw.len(),
        raw: Some(raw.to_string()),
    }
}

/// The shape a rule recognises, when the body has one.
fn known_shape(value: &Value, is_chat: bool) -> Option<&'static str> {
    if is_chat {
        return Some("choices");
    }
    if value.get("pages").is_some_and(Value::is_array) {
        return Some("pages");
    }
    if value.get("elements").is_some_and(Value::is_array) {
        return Some("elements");
    }
    None
}

// ── Chat repackaging ────────────────────────────────────────────────────────

/// `{"choices":[{"message":{"content":…}}]}` → `{"pages":[{"markdown":…}]}`.
///
/// `content` may be a string or a list of `{"type":"text","text":…}` chunks.
pub fn repackage_chat(value: &Value) -> Option<Value> {
    let content = value.get("choices")?.get(0)?.get("message")?.get("content")?;
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(chunks) => chunks
            .iter()
            .filter_map(|c| c.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => return None,
    };
    Some(json!({ "pages": [{ "markdown": text }] }))
}

// ── Rules ───────────────────────────────────────────────────────────────────

fn pages_markdown(value: &Value) -> Option<String> {
    let pages = value.get("pages")?.as_array()?;
    let parts: Vec<&str> = pages
        .iter()
        .filter_map(|p| p.get("markdown").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("\n\n"))
}

fn top_level_text(value: &Value) -> Option<String> {
    value.get("text")?.as_str().map(str::to_string)
}

fn elements_text(value: &Value) -> Option<String> {
    let elements = value.get("elements")?.as_array()?;
    let parts: Vec<&str> = elements
        .iter()
        .filter_map(|e| e.get("text").and_then(Value::as_str))
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("\n"))
}

fn top_level_content(value: &Value) -> Option<String> {
    value.get("content")?.as_str().map(str::to_string)
}

// ── Error signal ────────────────────────────────────────────────────────────

const ERROR_MARKERS: &[&str] = &["error", "not found"];

fn contains_marker(s: &str) -> bool {
    let lower = s.to_lowercase();
    ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

fn signals_error(raw: &str, value: &Value, scope: EscalationScope) -> bool {
    match scope {
        EscalationScope::RawBody => contains_marker(raw),
        EscalationScope::TopLevel => match value {
            Value::Object(map) => map.iter().any(|(k, v)| {
                contains_marker(k) || v.as_str().map(contains_marker).unwrap_or(false)
            }),
            Value::String(s) => contains_marker(s),
            _ => false,
        },
    }
}

/// Best human-readable message from an error body.
fn error_message(value: &Value) -> Option<String> {
    let candidate = value
        .get("error")
        .or_else(|| value.get("message"))
        .or_else(|| value.get("detail"))?;
    let msg = match candidate {
        Value::String(s) => s.clone(),
        Value::Object(o) => o
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| candidate.to_string()),
        other => other.to_string(),
    };
    Some(truncate(&msg, PARSE_PREVIEW_CHARS))
}

// ── Last-resort walk ────────────────────────────────────────────────────────

/// Collect every string leaf longer than one character as `path: value`.
pub fn walk_strings(value: &Value) -> String {
    let mut lines = Vec::new();
    walk(value, String::new(), &mut lines);
    lines.join("\n")
}

fn walk(value: &Value, path: String, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                walk(child, child_path, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, format!("{path}[{i}]"), out);
            }
        }
        Value::String(s) if s.chars().count() > 1 => {
            if path.is_empty() {
                out.push(s.clone());
            } else {
                out.push(format!("{path}: {s}"));
            }
        }
        _ => {}
    }
}
