//! File system session store.
//!
//! Layout, one directory per session:
//!
//! ```text
//! <base_dir>/<session_id>/session.json   record and state, replaced atomically
//! <base_dir>/<session_id>/turns.jsonl    one turn per line, append-only
//! ```
//!
//! A line only counts once its newline is written. A trailing fragment left
//! by an interrupted append is ignored by readers and cut off before the
//! next append.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{check_append, check_transition, not_found, validate_session_id, SessionRecord, SessionStore};
use crate::error::{Result, SessionError};
use crate::types::{SessionId, SessionState, Turn};

const RECORD_FILE: &str = "session.json";
const TURNS_FILE: &str = "turns.jsonl";

/// Persists sessions under a base directory. Writes to one session are
/// serialized by a per-session lock, dropped once the session ends;
/// different sessions proceed in parallel.
#[derive(Debug)]
pub struct FileSystemSessionStore {
    base_dir: PathBuf,
    /// Per-session lock guarding the cached last sequence number
    locks: DashMap<SessionId, Arc<Mutex<Option<u64>>>>,
}

impl FileSystemSessionStore {
    /// Create a new file system session store
    ///
    /// # Arguments
    /// * `base_dir` - Directory holding one subdirectory per session
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            locks: DashMap::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        validate_session_id(session_id)?;
        Ok(self.base_dir.join(session_id))
    }

    fn lock_for(&self, session_id: &str) -> Arc<Mutex<Option<u64>>> {
        Arc::clone(
            self.locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None)))
                .value(),
        )
    }

    async fn load_record(&self, session_id: &str) -> Result<SessionRecord> {
        let path = self.session_dir(session_id)?.join(RECORD_FILE);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Err(not_found(session_id).into()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&json).map_err(|e| {
            SessionError::Corrupted {
                session_id: session_id.to_string(),
                details: format!("unreadable {}: {}", RECORD_FILE, e),
            }
            .into()
        })
    }

    async fn write_record(&self, record: &SessionRecord) -> Result<()> {
        let dir = self.session_dir(&record.session_id)?;
        let tmp = dir.join(format!("{}.tmp", RECORD_FILE));
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, dir.join(RECORD_FILE)).await?;
        Ok(())
    }

    async fn load_turns(&self, session_id: &str) -> Result<Vec<Turn>> {
        let path = self.session_dir(session_id)?.join(TURNS_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let complete = &content[..complete_len(content.as_bytes())];
        if complete.len() < content.len() {
            debug!(session_id = %session_id, "Ignoring unterminated trailing line");
        }
        complete
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<Turn>(line).map_err(|e| {
                    SessionError::Corrupted {
                        session_id: session_id.to_string(),
                        details: format!("line {} of {}: {}", index + 1, TURNS_FILE, e),
                    }
                    .into()
                })
            })
            .collect()
    }

    /// Cut an unterminated trailing fragment off the transcript file
    async fn trim_partial_tail(&self, path: &Path) -> Result<()> {
        let content = match fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let complete = complete_len(&content);
        if complete < content.len() {
            warn!(
                path = %path.display(),
                dropped_bytes = content.len() - complete,
                "Truncating partial turn left by an interrupted append"
            );
            let file = fs::OpenOptions::new().write(true).open(path).await?;
            file.set_len(complete as u64).await?;
        }
        Ok(())
    }
}

/// Length of the prefix of `content` made of newline-terminated lines
fn complete_len(content: &[u8]) -> usize {
    content.iter().rposition(|b| *b == b'\n').map_or(0, |i| i + 1)
}

#[async_trait]
impl SessionStore for FileSystemSessionStore {
    async fn create(&self, record: SessionRecord) -> Result<()> {
        let dir = self.session_dir(&record.session_id)?;
        let lock = self.lock_for(&record.session_id);
        let mut last = lock.lock().await;

        fs::create_dir_all(&self.base_dir).await?;
        match fs::create_dir(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                return Err(SessionError::AlreadyExists {
                    session_id: record.session_id.clone(),
                }
                .into())
            }
            Err(e) => return Err(e.into()),
        }
        fs::write(dir.join(TURNS_FILE), b"").await?;
        self.write_record(&record).await?;
        *last = Some(0);
        debug!(session_id = %record.session_id, path = %dir.display(), "Created session directory");
        Ok(())
    }

    async fn append(&self, session_id: &str, turn: Turn) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        let lock = self.lock_for(session_id);
        let mut last = lock.lock().await;

        let record = self.load_record(session_id).await?;
        let path = dir.join(TURNS_FILE);
        let last_sequence = match *last {
            Some(seq) => seq,
            None => {
                self.trim_partial_tail(&path).await?;
                self.load_turns(session_id).await?.last().map_or(0, |t| t.sequence_number)
            }
        };
        check_append(session_id, record.state, last_sequence, &turn)?;

        let mut line = serde_json::to_string(&turn)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        let start = file.seek(std::io::SeekFrom::End(0)).await?;
        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            *last = None;
            if let Err(rollback) = file.set_len(start).await {
                warn!(session_id = %session_id, error = %rollback, "Failed to roll back partial append");
            }
            return Err(e.into());
        }

        *last = Some(turn.sequence_number);
        Ok(())
    }

    async fn read(&self, session_id: &str, from_sequence: u64) -> Result<Vec<Turn>> {
        self.load_record(session_id).await?;
        let turns = self.load_turns(session_id).await?;
        Ok(turns.into_iter().filter(|t| t.sequence_number > from_sequence).collect())
    }

    async fn get_state(&self, session_id: &str) -> Result<SessionState> {
        Ok(self.load_record(session_id).await?.state)
    }

    async fn set_state(&self, session_id: &str, state: SessionState) -> Result<()> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let mut record = self.load_record(session_id).await?;
        check_transition(record.state, state)?;
        if record.state != state {
            record.state = state;
            record.updated_at = Utc::now();
            self.write_record(&record).await?;
        }
        if state.is_terminal() {
            // Ended sessions take no more appends
            self.locks.remove(session_id);
        }
        Ok(())
    }

    async fn get_record(&self, session_id: &str) -> Result<SessionRecord> {
        self.load_record(session_id).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionId>> {
        let mut entries = match fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.path().join(RECORD_FILE).exists() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
