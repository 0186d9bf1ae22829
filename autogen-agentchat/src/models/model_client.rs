//! Model client trait.

use async_trait::async_trait;

use super::types::{CreateResult, LlmMessage, ModelConfig};
use crate::{error::Result, tools::ToolSpec, CancellationToken};

/// A chat completion model. Implementations wrap a concrete provider.
#[async_trait]
pub trait ChatCompletionClient: Send + Sync {
    /// Create a single response from the model.
    ///
    /// # Arguments
    /// * `messages` - The messages to send to the model
    /// * `tools` - The tools the model may call
    /// * `config` - Model settings of the calling participant
    /// * `cancellation_token` - Token for cancellation
    ///
    /// # Returns
    /// The result of the model call
    async fn create(
        &self,
        messages: &[LlmMessage],
        tools: &[ToolSpec],
        config: &ModelConfig,
        cancellation_token: &CancellationToken,
    ) -> Result<CreateResult>;

    /// Name of the underlying model, used in logs
    fn model_name(&self) -> &str;
}
