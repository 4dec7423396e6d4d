//! Chat history storage
//!
//! Keeps the most recent question/answer turns per session in memory.
//! Session ids are arbitrary client strings; each maps to a stable UUID.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::AgentKind;

pub const DEFAULT_HISTORY_CAPACITY: usize = 50;
pub const DEFAULT_MAX_SESSIONS: usize = 1000;
const DEFAULT_SESSION: &str = "default-session";

/// One answered query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub turn_id: Uuid,
    pub query: String,
    pub response: String,
    pub agent: AgentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        agent: AgentKind,
        symbol: Option<String>,
    ) -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            query: query.into(),
            response: response.into(),
            agent,
            symbol,
            created_at: Utc::now(),
        }
    }
}

/// Bounded turn list for one session
#[derive(Debug, Clone)]
struct SessionHistory {
    turns: VecDeque<ChatTurn>,
    /// Value of the store clock at the last write
    last_used: u64,
}

impl SessionHistory {
    fn new() -> Self {
        Self {
            turns: VecDeque::new(),
            last_used: 0,
        }
    }

    fn push(&mut self, turn: ChatTurn, capacity: usize, now: u64) {
        self.turns.push_back(turn);
        while self.turns.len() > capacity {
            self.turns.pop_front();
        }
        self.last_used = now;
    }

    /// Last `count` turns, oldest first
    fn recent(&self, count: usize) -> Vec<ChatTurn> {
        let skip = self.turns.len().saturating_sub(count);
        self.turns.iter().skip(skip).cloned().collect()
    }
}

#[derive(Debug, Default)]
struct Sessions {
    by_id: HashMap<Uuid, SessionHistory>,
    /// Monotonic write counter, orders sessions by recency
    clock: u64,
}

impl Sessions {
    /// Drop least recently written sessions until one more fits.
    fn make_room(&mut self, max_sessions: usize) {
        while self.by_id.len() >= max_sessions {
            let Some(oldest) = self
                .by_id
                .iter()
                .min_by_key(|(_, history)| history.last_used)
                .map(|(id, _)| *id)
            else {
                break;
            };
            self.by_id.remove(&oldest);
            debug!(session_id = %oldest, "Evicted least recently used chat session");
        }
    }
}

pub struct ChatHistory {
    sessions: RwLock<Sessions>,
    capacity: usize,
    max_sessions: usize,
}

impl ChatHistory {
    pub fn new(capacity: usize, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(Sessions::default()),
            capacity: capacity.max(1),
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn record(&self, session: Option<&str>, turn: ChatTurn) -> Uuid {
        let session_id = session_uuid(session);
        let mut sessions = self.sessions.write().await;

        if !sessions.by_id.contains_key(&session_id) {
            sessions.make_room(self.max_sessions);
        }

        sessions.clock += 1;
        let now = sessions.clock;
        sessions
            .by_id
            .entry(session_id)
            .or_insert_with(SessionHistory::new)
            .push(turn, self.capacity, now);

        debug!(%session_id, "Recorded chat turn");
        session_id
    }

    pub async fn recent(&self, session: Option<&str>, count: usize) -> Vec<ChatTurn> {
        let sessions = self.sessions.read().await;
        sessions
            .by_id
            .get(&session_uuid(session))
            .map(|h| h.recent(count))
            .unwrap_or_default()
    }

    /// Remove every turn of a session, returning how many were dropped.
    pub async fn clear(&self, session: Option<&str>) -> usize {
        let mut sessions = self.sessions.write().await;
        sessions
            .by_id
            .remove(&session_uuid(session))
            .map(|h| h.turns.len())
            .unwrap_or(0)
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_MAX_SESSIONS)
    }
}

/// Derive a UUID from arbitrary text, so the same session string always maps
/// to the same history.
pub fn stable_uuid_from_string(input: &str) -> Uuid {
    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Parse a client session id, hashing it when it is not already a UUID.
pub fn session_uuid(value: Option<&str>) -> Uuid {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => {
            Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => stable_uuid_from_string(DEFAULT_SESSION),
    }
}
