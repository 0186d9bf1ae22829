//! Request/response front door.
//!
//! [`SessionService`] maps a flat [`AgentRequest`] onto the coordinator: the
//! first request for a session id starts a session of the configured team
//! with the query as its task, later requests feed the query to the running
//! session. Every request then advances the session a bounded number of
//! turns. Failures are reported inside the [`AgentResponse`], never as a
//! transport-level error.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AgentChatError, Result};
use crate::store::{validate_session_id, TranscriptPage, TranscriptQuery};
use crate::team::{ModelClientProvider, SessionSpec, TeamCoordinator, TeamDefinition};
use crate::types::{SessionState, Turn};

/// Longest accepted query, in characters
pub const MAX_QUERY_CHARS: usize = 32_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Turns a single request may produce
    pub max_advances_per_request: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_advances_per_request: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub query: String,
    pub user_id: String,
    #[serde(default = "new_request_id")]
    pub request_id: String,
    pub session_id: String,
}

impl AgentRequest {
    pub fn new(query: impl Into<String>, user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_id: user_id.into(),
            request_id: new_request_id(),
            session_id: session_id.into(),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err("query must not be empty".to_string());
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(format!("query exceeds {} characters", MAX_QUERY_CHARS));
        }
        if self.user_id.trim().is_empty() {
            return Err("user_id must not be empty".to_string());
        }
        validate_session_id(self.session_id.trim()).map_err(|e| e.to_string())
    }
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    pub fn success(output: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            output: output.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Serves requests for one team definition
pub struct SessionService {
    coordinator: Arc<TeamCoordinator>,
    team: TeamDefinition,
    provider: Arc<dyn ModelClientProvider>,
    config: ServiceConfig,
}

impl SessionService {
    /// # Errors
    /// Fails if the team does not validate against the coordinator's registry.
    pub fn new(
        coordinator: Arc<TeamCoordinator>,
        team: TeamDefinition,
        provider: Arc<dyn ModelClientProvider>,
        config: ServiceConfig,
    ) -> Result<Self> {
        team.validate(coordinator.registry())?;
        Ok(Self {
            coordinator,
            team,
            provider,
            config,
        })
    }

    pub fn coordinator(&self) -> &Arc<TeamCoordinator> {
        &self.coordinator
    }

    pub async fn handle(&self, request: AgentRequest) -> AgentResponse {
        if let Err(reason) = request.validate() {
            warn!(request_id = %request.request_id, reason = %reason, "Rejected request");
            return AgentResponse::failure(reason);
        }
        info!(
            request_id = %request.request_id,
            user_id = %request.user_id,
            session_id = %request.session_id.trim(),
            "Handling request"
        );
        match self.process(&request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(request_id = %request.request_id, error = %err, "Request failed");
                AgentResponse::failure(err.to_string())
            }
        }
    }

    /// Read-only transcript polling
    pub async fn poll_transcript(&self, query: &TranscriptQuery) -> Result<TranscriptPage> {
        self.coordinator.store().read_page(query).await
    }

    async fn process(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let session_id = request.session_id.trim();
        let query = request.query.trim();

        if self.coordinator.store().exists(session_id).await? {
            let state = self.coordinator.session_state(session_id).await?;
            if state.is_terminal() {
                return Ok(AgentResponse::failure(format!("session '{}' has ended ({})", session_id, state)));
            }
            if !self.coordinator.has_session(session_id) {
                return Ok(AgentResponse::failure(format!(
                    "session '{}' ({}) is not loaded in this process",
                    session_id, state
                )));
            }
            self.coordinator.post_user_message(session_id, query).await?;
        } else {
            let participants = self.team.instantiate(self.provider.as_ref())?;
            let spec = SessionSpec::new(participants, self.team.termination.clone())
                .with_session_id(session_id)
                .with_task(query)
                .with_team_name(self.team.name.clone());
            self.coordinator.create_session(spec).await?;
        }

        let produced = match self
            .coordinator
            .run_until_end(session_id, self.config.max_advances_per_request)
            .await
        {
            Ok(produced) => produced,
            Err(AgentChatError::Cancelled) => {
                return Ok(AgentResponse::failure(AgentChatError::Cancelled.to_string()));
            }
            Err(err) => return Err(err),
        };

        let state = self.coordinator.session_state(session_id).await?;
        let output = match produced.last() {
            Some(turn) => turn.message.clone(),
            None => self
                .coordinator
                .transcript(session_id)
                .await?
                .last()
                .map(|t| t.message.clone())
                .unwrap_or_default(),
        };
        Ok(AgentResponse::success(output, summary(request, session_id, state, &produced)))
    }
}

fn summary(request: &AgentRequest, session_id: &str, state: SessionState, produced: &[Turn]) -> Value {
    let tool_calls: usize = produced.iter().map(|t| t.tool_calls.len()).sum();
    let limitations: Vec<String> = produced
        .iter()
        .filter_map(|t| t.limitation.as_ref().map(|l| format!("{}: {}", t.participant_id, l)))
        .collect();
    json!({
        "session_id": session_id,
        "request_id": request.request_id,
        "state": state,
        "turns": produced.len(),
        "tool_calls": tool_calls,
        "limitations": limitations,
    })
}
