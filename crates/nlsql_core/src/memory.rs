//! Last-turn conversation memory and its per-session store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::executor::ResultRow;

/// The single retained turn.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryState {
    pub question: String,
    /// The statement that actually ran, after any repair.
    pub sql: String,
    pub rows: Vec<ResultRow>,
}

/// One-slot memory of the last successful turn. Saving overwrites.
#[derive(Debug, Default)]
pub struct ConversationMemory {
    slot: RwLock<Option<MemoryState>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, question: impl Into<String>, sql: impl Into<String>, rows: Vec<ResultRow>) {
        *self.slot.write() = Some(MemoryState {
            question: question.into(),
            sql: sql.into(),
            rows,
        });
    }

    pub fn has_context(&self) -> bool {
        self.slot.read().is_some()
    }

    pub fn context(&self) -> Option<MemoryState> {
        self.slot.read().clone()
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}

/// Prior-turn data injected into a synthesis prompt.
///
/// Built from [`MemoryState`] or supplied by a caller that keeps its own
/// history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBlock {
    #[serde(default, alias = "last_question")]
    pub question: Option<String>,
    #[serde(default, alias = "last_sql")]
    pub sql: Option<String>,
    #[serde(default, alias = "last_rows_preview")]
    pub result_preview: Option<String>,
    #[serde(default, alias = "last_error")]
    pub error: Option<String>,
}

impl ContextBlock {
    pub fn from_memory(state: &MemoryState, preview_rows: usize) -> Self {
        ContextBlock {
            question: Some(state.question.clone()),
            sql: Some(state.sql.clone()),
            result_preview: Some(rows_preview(&state.rows, preview_rows)),
            error: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.question.is_none()
            && self.sql.is_none()
            && self.result_preview.is_none()
            && self.error.is_none()
    }
}

/// Column names plus the first `max_rows` rows as json.
pub fn rows_preview(rows: &[ResultRow], max_rows: usize) -> String {
    let Some(first) = rows.first() else {
        return "rows: []".to_string();
    };

    let columns = first.keys().map(String::as_str).collect::<Vec<_>>();
    let mut preview = format!("columns: [{}]\nfirst_rows:\n", columns.join(", "));
    for row in rows.iter().take(max_rows) {
        // Map of json values always serializes.
        let json = serde_json::Value::Object(row.clone());
        preview.push_str(&format!("  - {json}\n"));
    }
    preview
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new_v4() -> Self {
        SessionId(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(SessionId)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug)]
struct SessionEntry {
    memory: Arc<ConversationMemory>,
    last_used: Mutex<Instant>,
}

/// Conversation memories keyed by session.
///
/// Sessions are created on first use, ended explicitly with [`end`] or
/// dropped by [`expire_idle`] once unused for longer than the ttl.
///
/// [`end`]: SessionStore::end
/// [`expire_idle`]: SessionStore::expire_idle
#[derive(Default)]
pub struct SessionStore {
    sessions: scc::HashMap<SessionId, Arc<SessionEntry>>,
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the memory for a session, creating an empty one if needed. Marks the
    /// session as used.
    pub fn get_or_create(&self, id: SessionId) -> Arc<ConversationMemory> {
        let entry = self
            .sessions
            .entry(id)
            .or_insert_with(|| {
                debug!(session = %id, "creating session");
                Arc::new(SessionEntry {
                    memory: Arc::new(ConversationMemory::new()),
                    last_used: Mutex::new(Instant::now()),
                })
            })
            .get()
            .clone();

        *entry.last_used.lock() = Instant::now();
        entry.memory.clone()
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<ConversationMemory>> {
        self.sessions.read(&id, |_, entry| entry.memory.clone())
    }

    /// Remove a session. Returns false if it didn't exist.
    pub fn end(&self, id: SessionId) -> bool {
        let removed = self.sessions.remove(&id).is_some();
        if removed {
            debug!(session = %id, "ended session");
        }
        removed
    }

    /// Drop sessions idle for longer than `ttl`. Returns how many were dropped.
    pub fn expire_idle(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        let now = Instant::now();
        self.sessions
            .retain(|_, entry| now.duration_since(*entry.last_used.lock()) <= ttl);
        let expired = before.saturating_sub(self.sessions.len());
        if expired > 0 {
            debug!(expired, "expired idle sessions");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
