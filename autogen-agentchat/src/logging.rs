//! Structured event records and tracing setup.
//!
//! Events serialize to one JSON object each, carry a `type` field, and are
//! emitted at `info` on [`EVENT_TARGET`] so that they can be routed apart
//! from ordinary diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::types::{SessionState, ToolExchange, ToolStatus, Turn};

/// Tracing target of structured events
pub const EVENT_TARGET: &str = "autogen_agentchat.events";

fn write_json<T: Serialize>(value: &T, name: &str, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match serde_json::to_string(value) {
        Ok(json) => write!(f, "{}", json),
        Err(_) => write!(f, "{} serialization error", name),
    }
}

/// Event for logging model calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: String,
    pub participant: String,
    pub model: String,
    pub message_count: usize,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl LlmCallEvent {
    pub fn new(
        session_id: &str,
        participant: &str,
        model: &str,
        message_count: usize,
        prompt_tokens: u32,
        completion_tokens: u32,
    ) -> Self {
        Self {
            event_type: "LLMCall".to_string(),
            session_id: session_id.to_string(),
            participant: participant.to_string(),
            model: model.to_string(),
            message_count,
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn emit(&self) {
        info!(target: EVENT_TARGET, "{}", self);
    }
}

impl fmt::Display for LlmCallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(self, "LlmCallEvent", f)
    }
}

/// Event for logging tool calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: String,
    pub participant: String,
    pub tool_name: String,
    pub call_id: String,
    pub chain_id: String,
    pub attempt: u32,
    pub arguments: serde_json::Map<String, serde_json::Value>,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub elapsed_ms: u64,
}

impl ToolCallEvent {
    pub fn from_exchange(participant: &str, exchange: &ToolExchange) -> Self {
        Self {
            event_type: "ToolCall".to_string(),
            session_id: exchange.call.session_id.clone(),
            participant: participant.to_string(),
            tool_name: exchange.call.tool_name.clone(),
            call_id: exchange.call.call_id.clone(),
            chain_id: exchange.call.chain_id.clone(),
            attempt: exchange.call.attempt,
            arguments: exchange.call.arguments.clone(),
            status: exchange.result.status,
            error_kind: exchange.result.error_kind.map(|k| k.to_string()),
            elapsed_ms: exchange.result.elapsed_ms,
        }
    }

    pub fn emit(&self) {
        info!(target: EVENT_TARGET, "{}", self);
    }
}

impl fmt::Display for ToolCallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(self, "ToolCallEvent", f)
    }
}

/// Event for logging appended turns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: String,
    pub participant: String,
    pub sequence_number: u64,
    pub tool_calls: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limitation: Option<String>,
}

impl TurnEvent {
    pub fn from_turn(turn: &Turn) -> Self {
        Self {
            event_type: "Turn".to_string(),
            session_id: turn.session_id.clone(),
            participant: turn.participant_id.clone(),
            sequence_number: turn.sequence_number,
            tool_calls: turn.tool_calls.len(),
            handoff: turn.handoff.clone(),
            limitation: turn.limitation.as_ref().map(|l| l.to_string()),
        }
    }

    pub fn emit(&self) {
        info!(target: EVENT_TARGET, "{}", self);
    }
}

impl fmt::Display for TurnEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(self, "TurnEvent", f)
    }
}

/// Event for logging the end of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: String,
    pub state: SessionState,
    pub turns: usize,
    pub reason: String,
}

impl TerminationEvent {
    pub fn new(session_id: &str, state: SessionState, turns: usize, reason: impl Into<String>) -> Self {
        Self {
            event_type: "Termination".to_string(),
            session_id: session_id.to_string(),
            state,
            turns,
            reason: reason.into(),
        }
    }

    pub fn emit(&self) {
        info!(target: EVENT_TARGET, "{}", self);
    }
}

impl fmt::Display for TerminationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_json(self, "TerminationEvent", f)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Calling this more than
/// once is harmless; later calls leave the first subscriber in place.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
