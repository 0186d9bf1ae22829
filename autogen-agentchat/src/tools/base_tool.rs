//! The tool invocation contract.
//!
//! A tool is an external collaborator: it receives typed arguments and an
//! invocation context and answers with a [`ToolOutcome`]. Timeouts,
//! retries and fallbacks are imposed by the caller, never by the tool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::marshal::TypedArgs;
use crate::cancellation::CancellationToken;
use crate::types::{ParticipantId, SessionId};

/// Result reported by a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Ok { payload: Value },
    Error { kind: String, detail: String },
}

impl ToolOutcome {
    pub fn ok(payload: Value) -> Self {
        ToolOutcome::Ok { payload }
    }

    /// A failure with a collaborator-defined kind such as `"timeout"` or `"http_503"`
    pub fn error(kind: impl Into<String>, detail: impl Into<String>) -> Self {
        ToolOutcome::Error {
            kind: kind.into(),
            detail: detail.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok { .. })
    }
}

/// Who is calling a tool, and on which attempt
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub call_id: String,
    pub attempt: u32,
    /// Cancelled when the session is cancelled or the call times out
    pub cancellation: CancellationToken,
}

/// Performs a tool call. Implementations hold no loop or retry logic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, args: &TypedArgs, ctx: &InvocationContext) -> ToolOutcome;
}
