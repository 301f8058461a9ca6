//! Persisted achievement progress (SQLite).
//!
//! Local file DB, the only state with a lifecycle beyond one session.
//! Loaded once at startup; every tracker mutation flushes the touched row.

use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One achievement's persisted counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProgressEntry {
    pub counter: u32,
    pub unlocked: bool,
    pub unlocked_at_ms: Option<i64>,
}

/// Key-value store: achievement id -> progress row.
#[derive(Clone)]
pub struct ProgressStore {
    db_path: PathBuf,
}

impl ProgressStore {
    pub fn new(db_path: PathBuf) -> Result<Self, rusqlite::Error> {
        let this = Self { db_path };
        this.init()?;
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection, rusqlite::Error> {
        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
    }

    fn init(&self) -> Result<(), rusqlite::Error> {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS achievements (
                id TEXT PRIMARY KEY,
                counter INTEGER NOT NULL DEFAULT 0,
                unlocked INTEGER NOT NULL DEFAULT 0,
                unlocked_at_ms INTEGER NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Load every persisted row. Unknown achievement ids are kept; the
    /// tracker ignores rows without a matching rule.
    pub fn load_all(&self) -> Result<HashMap<String, ProgressEntry>, rusqlite::Error> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT id, counter, unlocked, unlocked_at_ms FROM achievements")?;
        let rows = stmt
            .query_map([], |r| {
                let id: String = r.get(0)?;
                let counter: i64 = r.get(1)?;
                let unlocked: i64 = r.get(2)?;
                let unlocked_at_ms: Option<i64> = r.get(3)?;
                Ok((
                    id,
                    ProgressEntry {
                        counter: counter.max(0) as u32,
                        unlocked: unlocked != 0,
                        unlocked_at_ms,
                    },
                ))
            })?
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// Flush one row.
    pub fn upsert(&self, id: &str, entry: &ProgressEntry) -> Result<(), rusqlite::Error> {
        let conn = self.open()?;
        conn.execute(
            r#"
            INSERT INTO achievements (id, counter, unlocked, unlocked_at_ms)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                counter = excluded.counter,
                unlocked = excluded.unlocked,
                unlocked_at_ms = excluded.unlocked_at_ms
            "#,
            params![
                id,
                entry.counter as i64,
                entry.unlocked as i64,
                entry.unlocked_at_ms
            ],
        )?;
        Ok(())
    }
}
