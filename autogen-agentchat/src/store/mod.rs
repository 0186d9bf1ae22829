//! Session persistence.
//!
//! A [`SessionStore`] owns the durable view of every session: its record,
//! its lifecycle state and its append-only transcript. Stores enforce the
//! transcript rules themselves (contiguous sequence numbers, no appends
//! after a session ended, forward-only state transitions), so a buggy
//! caller cannot corrupt a transcript.

mod filesystem;
mod memory;

pub use filesystem::FileSystemSessionStore;
pub use memory::InMemorySessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::team::TerminationCondition;
use crate::types::{ParticipantId, SessionId, SessionState, Turn};

/// Durable description of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
    /// Participant ids in round-robin order
    pub participants: Vec<ParticipantId>,
    pub termination: TerminationCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(
        session_id: impl Into<String>,
        participants: Vec<ParticipantId>,
        termination: TerminationCondition,
        task: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            team_name: None,
            participants,
            termination,
            task,
            state: SessionState::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Polling request for a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptQuery {
    pub session_id: SessionId,
    /// Return turns with a sequence number greater than this
    #[serde(default)]
    pub from_sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl TranscriptQuery {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            from_sequence: 0,
            limit: None,
        }
    }

    pub fn from_sequence(mut self, from_sequence: u64) -> Self {
        self.from_sequence = from_sequence;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A slice of a transcript plus the cursor for the next poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptPage {
    pub session_id: SessionId,
    pub state: SessionState,
    pub turns: Vec<Turn>,
    /// Pass as `from_sequence` to continue polling
    pub next_from: u64,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new session. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, record: SessionRecord) -> Result<()>;

    /// Append the next turn of an active session
    async fn append(&self, session_id: &str, turn: Turn) -> Result<()>;

    /// Turns with `sequence_number > from_sequence`, in order
    async fn read(&self, session_id: &str, from_sequence: u64) -> Result<Vec<Turn>>;

    async fn get_state(&self, session_id: &str) -> Result<SessionState>;

    /// Move a session forward in its lifecycle
    async fn set_state(&self, session_id: &str, state: SessionState) -> Result<()>;

    async fn get_record(&self, session_id: &str) -> Result<SessionRecord>;

    /// Ids of every stored session, sorted
    async fn list_sessions(&self) -> Result<Vec<SessionId>>;

    async fn read_page(&self, query: &TranscriptQuery) -> Result<TranscriptPage> {
        let state = self.get_state(&query.session_id).await?;
        let mut turns = self.read(&query.session_id, query.from_sequence).await?;
        if let Some(limit) = query.limit {
            turns.truncate(limit);
        }
        let next_from = turns.last().map_or(query.from_sequence, |t| t.sequence_number);
        Ok(TranscriptPage {
            session_id: query.session_id.clone(),
            state,
            turns,
            next_from,
        })
    }

    async fn exists(&self, session_id: &str) -> Result<bool> {
        match self.get_state(session_id).await {
            Ok(_) => Ok(true),
            Err(crate::AgentChatError::Session(SessionError::NotFound { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Session ids are 1 to 128 chars of `[A-Za-z0-9_.-]`, and not `.` or `..`
pub fn validate_session_id(session_id: &str) -> std::result::Result<(), SessionError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id != "."
        && session_id != ".."
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(SessionError::InvalidId {
            session_id: session_id.to_string(),
        })
    }
}

/// Rules every store applies before appending
pub(crate) fn check_append(
    session_id: &str,
    state: SessionState,
    last_sequence: u64,
    turn: &Turn,
) -> std::result::Result<(), SessionError> {
    if state.is_terminal() {
        return Err(SessionError::Ended {
            session_id: session_id.to_string(),
            state,
        });
    }
    if turn.session_id != session_id {
        return Err(SessionError::Corrupted {
            session_id: session_id.to_string(),
            details: format!("turn belongs to session '{}'", turn.session_id),
        });
    }
    let expected = last_sequence + 1;
    if turn.sequence_number != expected {
        return Err(SessionError::SequenceGap {
            session_id: session_id.to_string(),
            expected,
            found: turn.sequence_number,
        });
    }
    Ok(())
}

pub(crate) fn check_transition(from: SessionState, to: SessionState) -> std::result::Result<(), SessionError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(SessionError::InvalidTransition { from, to })
    }
}

pub(crate) fn not_found(session_id: &str) -> SessionError {
    SessionError::NotFound {
        session_id: session_id.to_string(),
    }
}
