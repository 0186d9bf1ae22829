//! Core data model shared by the reasoning loop, the coordinator and the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::policy::ErrorKind;

/// Identifier of a conversation session
pub type SessionId = String;

/// Identifier of a participant within a team
pub type ParticipantId = String;

/// Lifecycle state of a session. Transitions only go forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Terminated,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Active)
    }

    /// Active -> {Terminated, Failed}; re-asserting the current state is allowed.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        *self == next || (*self == SessionState::Active && next.is_terminal())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Active => "active",
            SessionState::Terminated => "terminated",
            SessionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A single dispatch of a tool. Retries produce new calls with a higher `attempt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique id of this dispatch
    pub call_id: String,
    /// Id shared by every retry and fallback of one logical call
    pub chain_id: String,
    pub tool_name: String,
    /// Marshaled arguments as sent to the tool
    pub arguments: serde_json::Map<String, Value>,
    /// 1-based, increasing along the call chain
    pub attempt: u32,
    pub session_id: SessionId,
    /// Sequence number of the turn that issued the call
    pub turn_id: u64,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Ok,
    Error,
}

/// Outcome of exactly one dispatched [`ToolCall`]. Refers to the call by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_ref: String,
    pub status: ToolStatus,
    pub raw_payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub elapsed_ms: u64,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, payload: Value, elapsed_ms: u64) -> Self {
        Self {
            call_ref: call.call_id.clone(),
            status: ToolStatus::Ok,
            raw_payload: payload,
            error_kind: None,
            detail: None,
            elapsed_ms,
        }
    }

    pub fn error(call: &ToolCall, kind: ErrorKind, detail: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            call_ref: call.call_id.clone(),
            status: ToolStatus::Error,
            raw_payload: Value::Null,
            error_kind: Some(kind),
            detail: Some(detail.into()),
            elapsed_ms,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ToolStatus::Ok
    }
}

/// A dispatched call paired with its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExchange {
    pub call: ToolCall,
    pub result: ToolResult,
}

/// Why a turn's answer is incomplete. Incomplete answers are still successful turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Limitation {
    /// The per-turn tool invocation bound was hit
    LoopBoundExceeded { max_invocations: u32 },
    /// Too many proposals were rejected before dispatch
    CorrectionsExhausted { max_corrections: u32 },
    /// Some tools failed after every retry and fallback
    ToolsUnavailable { tools: Vec<String> },
}

impl fmt::Display for Limitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Limitation::LoopBoundExceeded { max_invocations } => {
                write!(f, "tool invocation limit of {} reached", max_invocations)
            }
            Limitation::CorrectionsExhausted { max_corrections } => {
                write!(f, "{} rejected tool requests", max_corrections)
            }
            Limitation::ToolsUnavailable { tools } => {
                write!(f, "tools unavailable: {}", tools.join(", "))
            }
        }
    }
}

/// One participant's complete contribution to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub sequence_number: u64,
    pub message: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolExchange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limitation: Option<Limitation>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// A turn is idle when it did nothing new: no tools, no handoff, and a
    /// blank message or one identical to the participant's previous message.
    pub fn is_idle(&self, previous_by_same: Option<&Turn>) -> bool {
        if !self.tool_calls.is_empty() || self.handoff.is_some() {
            return false;
        }
        let message = self.message.trim();
        message.is_empty() || previous_by_same.is_some_and(|prev| prev.message.trim() == message)
    }
}

/// Append-only ordered sequence of turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn next_sequence(&self) -> u64 {
        self.turns.last().map_or(1, |t| t.sequence_number + 1)
    }

    /// Appends a turn whose sequence number continues the transcript.
    pub(crate) fn push(&mut self, turn: Turn) -> std::result::Result<(), (u64, u64)> {
        let expected = self.next_sequence();
        if turn.sequence_number != expected {
            return Err((expected, turn.sequence_number));
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Sequence numbers start at 1 and have no gaps or duplicates
    pub fn is_contiguous(&self) -> bool {
        self.turns
            .iter()
            .enumerate()
            .all(|(i, t)| t.sequence_number == i as u64 + 1)
    }
}
