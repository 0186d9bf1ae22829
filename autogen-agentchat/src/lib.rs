//! # AutoGen AgentChat
//!
//! Tool-augmented reasoning and multi-agent conversation coordination.
//! Participants are language-model driven roles with a system prompt and a
//! tool allow-list; a coordinator runs sessions in which they take turns,
//! call tools, and hand the conversation to each other until a termination
//! condition holds.
//!
//! ## Features
//!
//! - **Tool registry**: Typed tool descriptors with schema-validated arguments
//! - **Reasoning loop**: Bounded decide / invoke / answer cycles per turn
//! - **Error policy**: Retry with backoff, fallback tools, graceful degradation
//! - **Coordination**: Round-robin turns, handoffs, composable termination
//! - **Persistence**: In-memory and file system session stores
//! - **Observability**: Structured tracing events for calls, turns and sessions
//!
//! ## Quick Start
//!
//! ```rust
//! use autogen_agentchat::tools::{marshal_args, InputSchema, ParamType, ParameterSpec};
//! use serde_json::json;
//!
//! let schema = InputSchema::new(vec![
//!     ParameterSpec::required("x", ParamType::Integer),
//!     ParameterSpec::optional("label", ParamType::String),
//! ]);
//!
//! // Models often send numbers as strings; they are coerced to the declared type.
//! let args = marshal_args(&schema, &json!({"x": "12"})).unwrap();
//! assert_eq!(args.get("x").and_then(|v| v.as_i64()), Some(12));
//!
//! // Undeclared parameters are rejected with the offending field named.
//! let err = marshal_args(&schema, &json!({"x": 1, "y": 2})).unwrap_err();
//! assert_eq!(err.field(), Some("y"));
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

// Error types (must be first for other modules to use)
pub mod error;

// Core data model
pub mod types;
pub mod cancellation;
pub mod config;
pub mod logging;

// Tools and their failure handling
pub mod tools;
pub mod policy;

// Language model abstraction and the per-turn loop
pub mod models;
pub mod reasoning;

// Sessions
pub mod team;
pub mod store;
pub mod service;

// === Core Re-exports ===
pub use cancellation::CancellationToken;
pub use config::{AgentChatConfig, LoggingConfig, RetryPolicyConfig, ToolPolicy};
pub use error::{AgentChatError, Result};
pub use logging::init_tracing;
pub use models::{ChatCompletionClient, CreateResult, LlmMessage, ModelConfig};
pub use policy::{ErrorKind, ErrorPolicy, PolicyDecision};
pub use reasoning::{LoopConfig, LoopContext, ReasoningLoop, TurnOutcome, TurnRequest};
pub use service::{AgentRequest, AgentResponse, ServiceConfig, SessionService};
pub use store::{FileSystemSessionStore, InMemorySessionStore, SessionRecord, SessionStore, TranscriptPage, TranscriptQuery};
pub use team::{
    Advance, CoordinatorConfig, MentionScope, ModelClientProvider, Participant, ParticipantDefinition,
    SessionSpec, TeamCoordinator, TeamDefinition, TerminationCondition,
};
pub use tools::{
    FunctionTool, InvocationContext, OutputKind, ParamType, ParameterSpec, ToolDescriptor, ToolInvoker, ToolOutcome,
    ToolRegistry,
};
pub use types::{
    Limitation, ParticipantId, SessionId, SessionState, ToolCall, ToolExchange, ToolResult, ToolStatus, Transcript,
    Turn,
};

/// Current version of autogen-agentchat
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Root logger name for the autogen-agentchat library
pub const ROOT_LOGGER_NAME: &str = "autogen_agentchat";

/// Event logger name for structured session events
pub const EVENT_LOGGER_NAME: &str = logging::EVENT_TARGET;
