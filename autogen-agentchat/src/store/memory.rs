//! In-memory session store.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{check_append, check_transition, not_found, validate_session_id, SessionRecord, SessionStore};
use crate::error::{Result, SessionError};
use crate::types::{SessionId, SessionState, Transcript, Turn};

#[derive(Debug)]
struct StoredSession {
    record: SessionRecord,
    transcript: Transcript,
}

/// Keeps every session in process memory. Sessions are independent: each
/// has its own lock, so appends to different sessions never contend.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, Arc<RwLock<StoredSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self, session_id: &str) -> Result<Arc<RwLock<StoredSession>>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| not_found(session_id).into())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, record: SessionRecord) -> Result<()> {
        validate_session_id(&record.session_id)?;
        match self.sessions.entry(record.session_id.clone()) {
            Entry::Occupied(entry) => Err(SessionError::AlreadyExists {
                session_id: entry.key().clone(),
            }
            .into()),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(RwLock::new(StoredSession {
                    record,
                    transcript: Transcript::new(),
                })));
                Ok(())
            }
        }
    }

    async fn append(&self, session_id: &str, turn: Turn) -> Result<()> {
        let session = self.session(session_id)?;
        let mut guard = session.write().await;
        let last = guard.transcript.next_sequence() - 1;
        check_append(session_id, guard.record.state, last, &turn)?;
        guard
            .transcript
            .push(turn)
            .map_err(|(expected, found)| SessionError::SequenceGap {
                session_id: session_id.to_string(),
                expected,
                found,
            })?;
        guard.record.updated_at = Utc::now();
        Ok(())
    }

    async fn read(&self, session_id: &str, from_sequence: u64) -> Result<Vec<Turn>> {
        let session = self.session(session_id)?;
        let guard = session.read().await;
        Ok(guard
            .transcript
            .turns()
            .iter()
            .filter(|t| t.sequence_number > from_sequence)
            .cloned()
            .collect())
    }

    async fn get_state(&self, session_id: &str) -> Result<SessionState> {
        let session = self.session(session_id)?;
        let state = session.read().await.record.state;
        Ok(state)
    }

    async fn set_state(&self, session_id: &str, state: SessionState) -> Result<()> {
        let session = self.session(session_id)?;
        let mut guard = session.write().await;
        check_transition(guard.record.state, state)?;
        if guard.record.state != state {
            guard.record.state = state;
            guard.record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_record(&self, session_id: &str) -> Result<SessionRecord> {
        let session = self.session(session_id)?;
        let record = session.read().await.record.clone();
        Ok(record)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
