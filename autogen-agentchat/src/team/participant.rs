//! Participants: a role prompt, a tool allow-list and a model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::models::{ChatCompletionClient, ModelConfig};
use crate::types::ParticipantId;

/// Static description of a participant, as found in a team definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantDefinition {
    pub id: ParticipantId,
    #[serde(alias = "role")]
    pub system_prompt: String,
    #[serde(default)]
    pub tool_allow_list: Vec<String>,
    #[serde(default)]
    pub model: ModelConfig,
    /// Field paths of interest per tool, used to narrow structured observations
    #[serde(default)]
    pub interests: HashMap<String, Vec<String>>,
    /// Shown to peers when they are offered a handoff to this participant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParticipantDefinition {
    pub fn new(id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system_prompt: system_prompt.into(),
            tool_allow_list: Vec::new(),
            model: ModelConfig::default(),
            interests: HashMap::new(),
            description: None,
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tool_allow_list = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_interest(mut self, tool: impl Into<String>, paths: Vec<String>) -> Self {
        self.interests.insert(tool.into(), paths);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn allows(&self, tool: &str) -> bool {
        self.tool_allow_list.iter().any(|t| t == tool)
    }

    pub fn interest_for(&self, tool: &str) -> &[String] {
        self.interests.get(tool).map_or(&[], Vec::as_slice)
    }
}

/// A participant bound to the model client that speaks for it
#[derive(Clone)]
pub struct Participant {
    pub definition: ParticipantDefinition,
    pub client: Arc<dyn ChatCompletionClient>,
}

impl Participant {
    pub fn new(definition: ParticipantDefinition, client: Arc<dyn ChatCompletionClient>) -> Self {
        Self { definition, client }
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }
}

impl fmt::Debug for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Participant")
            .field("definition", &self.definition)
            .field("model", &self.client.model_name())
            .finish()
    }
}
