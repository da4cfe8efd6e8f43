//! Session persistence for conversation history
//!
//! Transcripts live in a single-file SQLite database, one row per turn,
//! keyed by session id and read back in insertion order.

use std::path::Path;

use assist_core::{AgentError, AgentResult, Role, Session, Turn};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS message_store (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    text TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_message_store_session ON message_store(session_id, id);
";

/// Overview of a stored session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub turn_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
}

/// SQLite-backed transcript store
pub struct SessionStore {
    conn: Connection,
}

fn storage(e: rusqlite::Error) -> AgentError {
    AgentError::Storage(e.to_string())
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> AgentResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AgentError::Storage(format!("invalid timestamp '{}': {}", raw, e)))
}

impl SessionStore {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> AgentResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(storage)?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "Opened session store");
        Ok(store)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> AgentResult<Self> {
        Self::init(Connection::open_in_memory().map_err(storage)?)
    }

    fn init(conn: Connection) -> AgentResult<Self> {
        conn.execute_batch(SCHEMA).map_err(storage)?;
        Ok(Self { conn })
    }

    /// Load a session, creating an empty one if it has no turns yet.
    ///
    /// Never fails: a read fault is logged and yields an empty transcript.
    pub fn load(&self, id: &str) -> Session {
        match self.try_load(id) {
            Ok(session) => {
                debug!(session_id = %id, turns = session.len(), "Loaded session");
                session
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "Failed to read transcript, starting empty");
                Session::empty(id)
            }
        }
    }

    fn try_load(&self, id: &str) -> AgentResult<Session> {
        let mut stmt = self
            .conn
            .prepare("SELECT role, text, timestamp FROM message_store WHERE session_id = ?1 ORDER BY id")
            .map_err(storage)?;

        let rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(storage)?;

        let mut transcript = Vec::new();
        for row in rows {
            let (role, text, timestamp) = row.map_err(storage)?;
            let role: Role = role.parse().map_err(AgentError::Storage)?;
            transcript.push(Turn::new(role, text, parse_timestamp(&timestamp)?));
        }

        Ok(Session {
            id: id.to_string(),
            transcript,
        })
    }

    /// Append a turn. The row is committed before this returns.
    pub fn append(&self, id: &str, turn: &Turn) -> AgentResult<()> {
        self.conn
            .execute(
                "INSERT INTO message_store (session_id, role, text, timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![id, turn.role.as_str(), turn.text, format_timestamp(&turn.timestamp)],
            )
            .map_err(storage)?;

        debug!(session_id = %id, role = %turn.role, len = turn.text.len(), "Appended turn");
        Ok(())
    }

    /// List stored sessions, most recently active first
    pub fn list_sessions(&self) -> AgentResult<Vec<SessionSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT session_id, COUNT(*), MAX(timestamp) FROM message_store
                 GROUP BY session_id ORDER BY MAX(id) DESC",
            )
            .map_err(storage)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(storage)?;

        let mut sessions = Vec::new();
        for row in rows {
            let (id, count, last) = row.map_err(storage)?;
            let last_activity = match last {
                Some(raw) => Some(parse_timestamp(&raw)?),
                None => None,
            };
            sessions.push(SessionSummary {
                id,
                turn_count: usize::try_from(count).unwrap_or(0),
                last_activity,
            });
        }

        Ok(sessions)
    }

    #[cfg(test)]
    pub(crate) fn drop_schema_for_tests(&self) {
        self.conn.execute_batch("DROP TABLE message_store").unwrap();
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_load_missing_session_is_empty() {
        let store = SessionStore::open_in_memory().unwrap();
        let session = store.load("default");
        assert_eq!(session.id, "default");
        assert!(session.is_empty());
    }

    #[test]
    fn test_append_then_load_round_trip() {
        let store = SessionStore::open_in_memory().unwrap();
        let first = Turn::user("hello aya");
        let second = Turn::new(Role::Agent, "Hello, Aya!", first.timestamp + Duration::milliseconds(5));

        store.append("default", &first).unwrap();
        let before = store.load("default");

        store.append("default", &second).unwrap();
        let after = store.load("default");

        assert_eq!(after.len(), 2);
        assert_eq!(after.transcript.last(), Some(&second));
        assert_eq!(&after.transcript[..1], &before.transcript[..]);
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = SessionStore::open_in_memory().unwrap();
        store.append("a", &Turn::user("one")).unwrap();
        store.append("b", &Turn::user("two")).unwrap();
        store.append("a", &Turn::agent("three")).unwrap();

        let a = store.load("a");
        let texts: Vec<&str> = a.transcript.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, ["one", "three"]);
        assert_eq!(store.load("b").len(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");

        let turn = Turn::user("remember me");
        {
            let store = SessionStore::open(&path).unwrap();
            store.append("default", &turn).unwrap();
        }

        let store = SessionStore::open(&path).unwrap();
        assert_eq!(store.load("default").transcript, vec![turn]);
    }

    #[test]
    fn test_open_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        std::fs::write(&path, vec![0x42u8; 4096]).unwrap();

        let err = SessionStore::open(&path).unwrap_err();
        assert!(matches!(err, AgentError::Storage(_)));
    }

    #[test]
    fn test_open_unreachable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("memory.db");
        assert!(matches!(SessionStore::open(&path), Err(AgentError::Storage(_))));
    }

    #[test]
    fn test_append_fails_when_table_is_gone() {
        let store = SessionStore::open_in_memory().unwrap();
        store.drop_schema_for_tests();

        let err = store.append("default", &Turn::user("hi")).unwrap_err();
        assert!(matches!(err, AgentError::Storage(_)));

        // load still never fails
        assert!(store.load("default").is_empty());
    }

    #[test]
    fn test_unknown_role_row_reads_as_empty() {
        let store = SessionStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO message_store (session_id, role, text, timestamp) VALUES ('default', 'system', 'x', ?1)",
                params![format_timestamp(&Utc::now())],
            )
            .unwrap();

        assert!(store.try_load("default").is_err());
        assert!(store.load("default").is_empty());
    }

    #[test]
    fn test_list_sessions() {
        let store = SessionStore::open_in_memory().unwrap();
        assert!(store.list_sessions().unwrap().is_empty());

        store.append("work", &Turn::user("a")).unwrap();
        store.append("default", &Turn::user("b")).unwrap();
        store.append("default", &Turn::agent("c")).unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "default");
        assert_eq!(sessions[0].turn_count, 2);
        assert_eq!(sessions[1].id, "work");
        assert!(sessions[1].last_activity.is_some());
    }
}
