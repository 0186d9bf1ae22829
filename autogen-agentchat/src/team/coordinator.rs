//! Multi-participant conversation coordination.
//!
//! A [`TeamCoordinator`] owns every live session. Each [`TeamCoordinator::advance`]
//! call produces at most one turn: it picks the next speaker, renders the
//! shared conversation from that speaker's point of view, runs the reasoning
//! loop, appends the resulting turn through the session store and evaluates
//! the termination condition. Sessions never share mutable state, so
//! different sessions advance in parallel while calls on one session are
//! serialized by that session's lock. Once a session ends its runtime is
//! released and only the store's copy remains.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::definition::{check_termination, validate_participants};
use super::participant::Participant;
use super::termination::TerminationCondition;
use crate::cancellation::CancellationToken;
use crate::error::{AgentChatError, Result, SessionError};
use crate::logging::{TerminationEvent, TurnEvent};
use crate::models::LlmMessage;
use crate::reasoning::{HandoffTarget, ReasoningLoop, TurnRequest};
use crate::store::{validate_session_id, SessionRecord, SessionStore};
use crate::tools::ToolRegistry;
use crate::types::{SessionId, SessionState, Turn};

/// Source label of user-provided messages in rendered history
pub const USER_SOURCE: &str = "user";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Most recent turns rendered into a participant's history
    pub max_history_turns: usize,
    /// Offer peers as handoff targets
    pub enable_handoffs: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_history_turns: 50,
            enable_handoffs: true,
        }
    }
}

/// Everything needed to start a session
#[derive(Debug, Clone)]
pub struct SessionSpec {
    /// Generated when absent
    pub session_id: Option<SessionId>,
    /// Round-robin order
    pub participants: Vec<Participant>,
    pub termination: TerminationCondition,
    pub task: Option<String>,
    pub team_name: Option<String>,
}

impl SessionSpec {
    pub fn new(participants: Vec<Participant>, termination: TerminationCondition) -> Self {
        Self {
            session_id: None,
            participants,
            termination,
            task: None,
            team_name: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_team_name(mut self, team_name: impl Into<String>) -> Self {
        self.team_name = Some(team_name.into());
        self
    }
}

/// Result of one [`TeamCoordinator::advance`] call
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Turn(Turn),
    /// The session had already ended; nothing was produced
    SessionEnded { state: SessionState },
}

impl Advance {
    pub fn turn(&self) -> Option<&Turn> {
        match self {
            Advance::Turn(turn) => Some(turn),
            Advance::SessionEnded { .. } => None,
        }
    }
}

/// A user message and the sequence number of the turn it follows
#[derive(Debug, Clone)]
struct UserInput {
    after_sequence: u64,
    text: String,
}

/// In-memory half of a session; the store holds the durable half
struct SessionRuntime {
    participants: Vec<Participant>,
    termination: TerminationCondition,
    task: Option<String>,
    next_speaker: usize,
    last_sequence: u64,
    user_inputs: Vec<UserInput>,
    cancel: CancellationToken,
}

impl SessionRuntime {
    fn participant_ids(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.id().to_string()).collect()
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.id() == id)
    }

    /// Round-robin successor, unless the speaker handed off to a known peer
    fn schedule_after(&mut self, speaker: usize, handoff: Option<&str>) {
        let successor = (speaker + 1) % self.participants.len();
        self.next_speaker = match handoff {
            Some(target) => match self.index_of(target) {
                Some(index) => index,
                None => {
                    warn!(target_participant = %target, "Ignoring handoff to unknown participant");
                    successor
                }
            },
            None => successor,
        };
    }

    /// The conversation as seen by `speaker`: the task, then turns and user
    /// messages in order. Own turns are assistant messages, peers' turns are
    /// user messages attributed to their author.
    fn render_history(&self, speaker: &str, turns: &[Turn], max_turns: usize) -> Vec<LlmMessage> {
        let mut history = Vec::new();
        if let Some(task) = &self.task {
            history.push(LlmMessage::user(task.clone(), Some(USER_SOURCE.to_string())));
        }

        let window = &turns[turns.len().saturating_sub(max_turns)..];
        let window_start = window.first().map_or(self.last_sequence, |t| t.sequence_number.saturating_sub(1));
        let mut inputs = self
            .user_inputs
            .iter()
            .filter(|input| input.after_sequence >= window_start)
            .peekable();

        for turn in window {
            while let Some(input) = inputs.next_if(|input| input.after_sequence < turn.sequence_number) {
                history.push(LlmMessage::user(input.text.clone(), Some(USER_SOURCE.to_string())));
            }
            let source = Some(turn.participant_id.clone());
            if turn.participant_id == speaker {
                history.push(LlmMessage::assistant_text(turn.message.clone(), source));
            } else {
                history.push(LlmMessage::user(turn.message.clone(), source));
            }
        }
        for input in inputs {
            history.push(LlmMessage::user(input.text.clone(), Some(USER_SOURCE.to_string())));
        }
        history
    }
}

/// Drives sessions of cooperating participants
pub struct TeamCoordinator {
    registry: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    reasoning: ReasoningLoop,
    config: CoordinatorConfig,
    sessions: DashMap<SessionId, Arc<Mutex<SessionRuntime>>>,
    /// Kept outside the session lock so a running turn can be cancelled
    tokens: DashMap<SessionId, CancellationToken>,
    shutdown: CancellationToken,
}

impl TeamCoordinator {
    pub fn new(reasoning: ReasoningLoop, store: Arc<dyn SessionStore>, config: CoordinatorConfig) -> Self {
        Self {
            registry: Arc::clone(&reasoning.context().registry),
            store,
            reasoning,
            config,
            sessions: DashMap::new(),
            tokens: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Validate and start a new session.
    ///
    /// # Errors
    /// * `SessionError::InvalidParticipants` for an empty team or duplicate ids
    /// * `RegistryError::UnknownTool` if an allow-list names an unregistered tool
    /// * `SessionError::AlreadyExists` or `SessionError::InvalidId` for the id
    pub async fn create_session(&self, spec: SessionSpec) -> Result<SessionId> {
        validate_participants(spec.participants.iter().map(|p| &p.definition))?;
        for participant in &spec.participants {
            self.registry.validate_allow_list(&participant.definition.tool_allow_list)?;
        }
        check_termination(&spec.termination)?;

        let session_id = spec.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        validate_session_id(&session_id)?;
        if self.sessions.contains_key(&session_id) {
            return Err(SessionError::AlreadyExists { session_id }.into());
        }

        let participant_ids: Vec<String> = spec.participants.iter().map(|p| p.id().to_string()).collect();
        let mut record = SessionRecord::new(
            session_id.clone(),
            participant_ids,
            spec.termination.clone(),
            spec.task.clone(),
        );
        record.team_name = spec.team_name;
        self.store.create(record).await?;

        let cancel = self.shutdown.child_token();
        let runtime = SessionRuntime {
            participants: spec.participants,
            termination: spec.termination,
            task: spec.task,
            next_speaker: 0,
            last_sequence: 0,
            user_inputs: Vec::new(),
            cancel: cancel.clone(),
        };
        match self.sessions.entry(session_id.clone()) {
            Entry::Occupied(_) => return Err(SessionError::AlreadyExists { session_id }.into()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(runtime)));
            }
        }
        self.tokens.insert(session_id.clone(), cancel);

        info!(session_id = %session_id, "Session created");
        Ok(session_id)
    }

    /// Produce the next turn of a session, or report that it has ended.
    ///
    /// Returns `AgentChatError::Cancelled` if the session is cancelled before
    /// or during the turn; the session is then `Failed` and nothing from the
    /// interrupted turn is kept. Model client errors are returned as-is and
    /// leave the session active.
    pub async fn advance(&self, session_id: &str) -> Result<Advance> {
        let runtime = match self.runtime(session_id) {
            Some(runtime) => runtime,
            None => {
                let state = self.ended_state(session_id).await?;
                return Ok(Advance::SessionEnded { state });
            }
        };
        let mut rt = runtime.lock().await;

        let state = self.store.get_state(session_id).await?;
        if state.is_terminal() {
            return Ok(Advance::SessionEnded { state });
        }
        if rt.cancel.is_cancelled() {
            self.end_session(session_id, SessionState::Failed, rt.last_sequence as usize, "cancelled")
                .await?;
            return Err(AgentChatError::Cancelled);
        }

        let mut turns = self.store.read(session_id, 0).await?;
        let speaker = rt.next_speaker;
        let participant = rt.participants[speaker].clone();
        let sequence_number = turns.last().map_or(0, |t| t.sequence_number) + 1;
        let handoff_targets = if self.config.enable_handoffs {
            rt.participants
                .iter()
                .filter(|peer| peer.id() != participant.id())
                .map(|peer| HandoffTarget::from(&peer.definition))
                .collect()
        } else {
            Vec::new()
        };
        debug!(
            session_id = %session_id,
            participant = %participant.id(),
            sequence_number,
            "Advancing session"
        );

        let request = TurnRequest {
            session_id,
            turn_id: sequence_number,
            participant: &participant.definition,
            client: participant.client.as_ref(),
            history: rt.render_history(participant.id(), &turns, self.config.max_history_turns),
            handoff_targets,
        };
        let outcome = match self.reasoning.run_turn(request, &rt.cancel).await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => {
                self.end_session(session_id, SessionState::Failed, turns.len(), "cancelled")
                    .await?;
                return Err(err);
            }
            Err(err) => {
                warn!(session_id = %session_id, participant = %participant.id(), error = %err, "Turn failed");
                return Err(err);
            }
        };

        let turn = Turn {
            session_id: session_id.to_string(),
            participant_id: participant.id().to_string(),
            sequence_number,
            message: outcome.message,
            tool_calls: outcome.tool_calls,
            handoff: outcome.handoff,
            limitation: outcome.limitation,
            created_at: Utc::now(),
        };
        if let Err(err) = self.store.append(session_id, turn.clone()).await {
            warn!(session_id = %session_id, error = %err, "Failed to append turn");
            let _ = self.store.set_state(session_id, SessionState::Failed).await;
            self.release(session_id);
            return Err(err);
        }
        rt.last_sequence = sequence_number;
        rt.schedule_after(speaker, turn.handoff.as_deref());
        TurnEvent::from_turn(&turn).emit();

        turns.push(turn.clone());
        if rt.termination.is_satisfied(&turns, &rt.participant_ids()) {
            let reason = rt.termination.to_string();
            self.end_session(session_id, SessionState::Terminated, turns.len(), &reason)
                .await?;
        }
        Ok(Advance::Turn(turn))
    }

    /// Advance until the session ends or `max_advances` turns were produced.
    /// Returns the turns produced by this call.
    pub async fn run_until_end(&self, session_id: &str, max_advances: usize) -> Result<Vec<Turn>> {
        let mut produced = Vec::new();
        for _ in 0..max_advances {
            match self.advance(session_id).await? {
                Advance::Turn(turn) => produced.push(turn),
                Advance::SessionEnded { .. } => break,
            }
            if self.store.get_state(session_id).await?.is_terminal() {
                break;
            }
        }
        Ok(produced)
    }

    /// Cancel a session. An in-flight turn is interrupted and discarded;
    /// the session is `Failed` once this returns. Cancelling a session that
    /// already ended has no effect.
    pub async fn cancel(&self, session_id: &str) -> Result<()> {
        let token = match self.tokens.get(session_id).map(|entry| entry.value().clone()) {
            Some(token) => token,
            None => {
                self.ended_state(session_id).await?;
                return Ok(());
            }
        };
        token.cancel();
        info!(session_id = %session_id, "Session cancellation requested");

        // Waits for an in-flight turn, which fails the session itself
        if let Some(runtime) = self.runtime(session_id) {
            let rt = runtime.lock().await;
            if !self.store.get_state(session_id).await?.is_terminal() {
                self.end_session(session_id, SessionState::Failed, rt.last_sequence as usize, "cancelled")
                    .await?;
            }
        }
        Ok(())
    }

    /// Cancel every session owned by this coordinator
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let live: Vec<SessionId> = self.tokens.iter().map(|entry| entry.key().clone()).collect();
        info!(sessions = live.len(), "Shutting down coordinator");
        for session_id in live {
            if let Err(err) = self.cancel(&session_id).await {
                warn!(session_id = %session_id, error = %err, "Failed to cancel session during shutdown");
            }
        }
    }

    /// Queue user input for the participants of an active session. The
    /// input is rendered into every later turn's history but is not a turn.
    pub async fn post_user_message(&self, session_id: &str, text: impl Into<String>) -> Result<()> {
        let runtime = match self.runtime(session_id) {
            Some(runtime) => runtime,
            None => {
                let state = self.ended_state(session_id).await?;
                return Err(SessionError::Ended {
                    session_id: session_id.to_string(),
                    state,
                }
                .into());
            }
        };
        let mut rt = runtime.lock().await;
        let state = self.store.get_state(session_id).await?;
        if state.is_terminal() {
            return Err(SessionError::Ended {
                session_id: session_id.to_string(),
                state,
            }
            .into());
        }
        let after_sequence = rt.last_sequence;
        rt.user_inputs.push(UserInput {
            after_sequence,
            text: text.into(),
        });
        Ok(())
    }

    /// Whether the session is live in this coordinator
    pub fn has_session(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub async fn session_state(&self, session_id: &str) -> Result<SessionState> {
        self.store.get_state(session_id).await
    }

    pub async fn transcript(&self, session_id: &str) -> Result<Vec<Turn>> {
        self.store.read(session_id, 0).await
    }

    fn runtime(&self, session_id: &str) -> Option<Arc<Mutex<SessionRuntime>>> {
        self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// State of a session without a runtime; only ended sessions qualify
    async fn ended_state(&self, session_id: &str) -> Result<SessionState> {
        match self.store.get_state(session_id).await {
            Ok(state) if state.is_terminal() => Ok(state),
            Ok(_) => Err(not_found(session_id)),
            Err(err) => Err(err),
        }
    }

    fn release(&self, session_id: &str) {
        self.sessions.remove(session_id);
        self.tokens.remove(session_id);
        debug!(session_id = %session_id, "Released session runtime");
    }

    async fn end_session(&self, session_id: &str, state: SessionState, turns: usize, reason: &str) -> Result<()> {
        self.store.set_state(session_id, state).await?;
        self.release(session_id);
        TerminationEvent::new(session_id, state, turns, reason).emit();
        info!(session_id = %session_id, state = %state, turns, reason, "Session ended");
        Ok(())
    }
}

fn not_found(session_id: &str) -> AgentChatError {
    SessionError::NotFound {
        session_id: session_id.to_string(),
    }
    .into()
}
