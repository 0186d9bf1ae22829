//! Declarative team definitions loaded from configuration files.
//!
//! ```toml
//! name = "research"
//!
//! [termination]
//! type = "text_mention"
//! text = "TERMINATE"
//!
//! [[participants]]
//! id = "researcher"
//! system_prompt = "You look things up."
//! tool_allow_list = ["search"]
//!
//! [[participants]]
//! id = "writer"
//! system_prompt = "You write the final answer."
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::participant::{Participant, ParticipantDefinition};
use super::termination::TerminationCondition;
use crate::error::{ConfigError, Result, SessionError};
use crate::models::ChatCompletionClient;
use crate::tools::ToolRegistry;

/// Supplies the model client for each participant of a team
pub trait ModelClientProvider: Send + Sync {
    fn client_for(&self, definition: &ParticipantDefinition) -> Result<Arc<dyn ChatCompletionClient>>;
}

/// Hands every participant the same client
impl ModelClientProvider for Arc<dyn ChatCompletionClient> {
    fn client_for(&self, _definition: &ParticipantDefinition) -> Result<Arc<dyn ChatCompletionClient>> {
        Ok(Arc::clone(self))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDefinition {
    pub name: String,
    /// Speaking order of the round-robin
    pub participants: Vec<ParticipantDefinition>,
    pub termination: TerminationCondition,
}

impl TeamDefinition {
    /// Load a team from a TOML, YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let team = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?
            .try_deserialize::<TeamDefinition>()?;
        Ok(team)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content).map_err(ConfigError::from)?)
    }

    pub fn participant_ids(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    /// Check the team against the tools that are actually registered
    pub fn validate(&self, registry: &ToolRegistry) -> Result<()> {
        validate_participants(self.participants.iter())?;
        for participant in &self.participants {
            registry.validate_allow_list(&participant.tool_allow_list)?;
        }
        check_termination(&self.termination)?;
        Ok(())
    }

    /// Bind every participant to its model client
    pub fn instantiate(&self, provider: &dyn ModelClientProvider) -> Result<Vec<Participant>> {
        self.participants
            .iter()
            .map(|definition| Ok(Participant::new(definition.clone(), provider.client_for(definition)?)))
            .collect()
    }
}

pub(crate) fn check_termination(termination: &TerminationCondition) -> std::result::Result<(), ConfigError> {
    termination.validate().map_err(|reason| ConfigError::InvalidValue {
        key: "termination".to_string(),
        value: termination.to_string(),
        expected: reason,
    })
}

/// At least one participant, with unique non-blank ids
pub(crate) fn validate_participants<'a, I>(participants: I) -> std::result::Result<(), SessionError>
where
    I: IntoIterator<Item = &'a ParticipantDefinition>,
{
    let mut seen = HashSet::new();
    for participant in participants {
        if participant.id.trim().is_empty() {
            return Err(SessionError::InvalidParticipants("participant id must not be blank".to_string()));
        }
        if !seen.insert(participant.id.as_str()) {
            return Err(SessionError::InvalidParticipants(format!(
                "duplicate participant id '{}'",
                participant.id
            )));
        }
    }
    if seen.is_empty() {
        return Err(SessionError::InvalidParticipants(
            "a session needs at least one participant".to_string(),
        ));
    }
    Ok(())
}
