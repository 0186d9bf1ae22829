//! Interpreting model output as a decision.
//!
//! A model answers either with structured function calls or with free text.
//! Free text may still carry a JSON tool request, fenced or bare, of the
//! shape `{"tool": "...", "parameters": {...}}`, a batch
//! `{"tool_calls": [...]}`, or a handoff `{"handoff": "peer", "message": "..."}`.
//! Objects that only resemble these shapes (an answer with a `name` field, an
//! empty `tool_calls` list) are part of the answer, not requests.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::models::{CreateResultContent, FunctionCall};

/// Function-name prefix through which a model hands the conversation to a peer
pub const HANDOFF_PREFIX: &str = "transfer_to_";

static JSON_FENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?\s*\n?([\s\S]*?)\n?```").expect("fence pattern is valid"));

/// A tool invocation the model asked for
#[derive(Debug, Clone, PartialEq)]
pub struct ToolProposal {
    pub call_id: String,
    pub tool_name: String,
    /// Raw arguments; an object or a string holding one
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelDecision {
    Invoke(ToolProposal),
    Handoff { target: String, message: String },
    Answer(String),
}

/// Decision plus the number of further calls the model requested in the same response
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    pub decision: ModelDecision,
    pub extra_calls: usize,
}

impl ParsedResponse {
    fn single(decision: ModelDecision) -> Self {
        Self {
            decision,
            extra_calls: 0,
        }
    }
}

pub fn interpret(content: &CreateResultContent) -> ParsedResponse {
    match content {
        CreateResultContent::FunctionCalls(calls) => match calls.split_first() {
            Some((first, rest)) => ParsedResponse {
                decision: from_function_call(first),
                extra_calls: rest.len(),
            },
            None => ParsedResponse::single(ModelDecision::Answer(String::new())),
        },
        CreateResultContent::Text(text) => interpret_text(text),
    }
}

fn from_function_call(call: &FunctionCall) -> ModelDecision {
    if let Some(target) = call.name.strip_prefix(HANDOFF_PREFIX) {
        let message = serde_json::from_str::<Value>(&call.arguments)
            .ok()
            .and_then(|args| args.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        return ModelDecision::Handoff {
            target: target.to_string(),
            message,
        };
    }
    ModelDecision::Invoke(ToolProposal {
        call_id: call.id.clone(),
        tool_name: call.name.clone(),
        arguments: Value::String(call.arguments.clone()),
    })
}

fn interpret_text(text: &str) -> ParsedResponse {
    let fenced = JSON_FENCE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str().trim()).ok());
    let bare = bare_objects(text).into_iter();

    for candidate in fenced.chain(bare) {
        if let Some(object) = candidate.as_object() {
            if let Some(parsed) = from_object(object, text) {
                return parsed;
            }
        }
    }
    ParsedResponse::single(ModelDecision::Answer(text.trim().to_string()))
}

fn from_object(object: &Map<String, Value>, text: &str) -> Option<ParsedResponse> {
    if let Some((target, message)) = handoff_from(object) {
        return Some(ParsedResponse::single(ModelDecision::Handoff { target, message }));
    }

    if let Some(proposal) = proposal_from(object, false) {
        return Some(ParsedResponse::single(ModelDecision::Invoke(proposal)));
    }

    if let Some(calls) = object.get("tool_calls").and_then(Value::as_array) {
        let tools_needed = object.get("tools_needed").and_then(Value::as_bool);
        let mut proposals = calls
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|call| proposal_from(call, true));
        return match (tools_needed, proposals.next()) {
            (Some(false), _) | (Some(true), None) => {
                let answer = object
                    .get("answer")
                    .or_else(|| object.get("reasoning"))
                    .and_then(Value::as_str)
                    .map_or_else(|| text.trim().to_string(), str::to_string);
                Some(ParsedResponse::single(ModelDecision::Answer(answer)))
            }
            (_, Some(first)) => Some(ParsedResponse {
                decision: ModelDecision::Invoke(first),
                extra_calls: proposals.count(),
            }),
            (None, None) => None,
        };
    }
    None
}

/// `{"handoff": "<peer>", "message": "..."}` and nothing else
fn handoff_from(object: &Map<String, Value>) -> Option<(String, String)> {
    let target = object.get("handoff").and_then(Value::as_str)?;
    if object.keys().any(|key| key != "handoff" && key != "message") {
        return None;
    }
    let message = object.get("message").and_then(Value::as_str).unwrap_or_default();
    Some((target.to_string(), message.to_string()))
}

/// A tool request names its tool and carries arguments. Entries of a
/// `tool_calls` list may omit the arguments, as may a lone `{"tool": ...}`.
fn proposal_from(object: &Map<String, Value>, listed: bool) -> Option<ToolProposal> {
    let tool_name = object
        .get("tool")
        .or_else(|| object.get("name"))
        .and_then(Value::as_str)?
        .to_string();
    let arguments = object.get("parameters").or_else(|| object.get("arguments"));
    let is_request = match arguments {
        Some(args) => args.is_object() || args.is_string(),
        None => listed || (object.len() == 1 && object.contains_key("tool")),
    };
    if !is_request {
        return None;
    }
    Some(ToolProposal {
        call_id: uuid::Uuid::new_v4().to_string(),
        tool_name,
        arguments: arguments.cloned().unwrap_or_else(|| Value::Object(Map::new())),
    })
}

/// Balanced `{...}` spans in `text` that parse as JSON, outermost first
fn bare_objects(text: &str) -> Vec<Value> {
    let mut found = Vec::new();
    let mut offset = 0;
    while let Some(start) = text[offset..].find('{').map(|i| i + offset) {
        match balanced_end(&text[start..]) {
            Some(len) => {
                if let Ok(value) = serde_json::from_str::<Value>(&text[start..start + len]) {
                    found.push(value);
                    offset = start + len;
                    continue;
                }
                offset = start + 1;
            }
            None => offset = start + 1,
        }
    }
    found
}

fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
