//! Language model integration and message types.
//!
//! This module provides the abstraction a participant uses to talk to its
//! language model: message types, results and the client trait.

mod model_client;
mod types;

pub use model_client::ChatCompletionClient;
pub use types::{
    AssistantContent, CreateResult, CreateResultContent, FunctionCall, LlmMessage, ModelConfig, RequestUsage,
};
