use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

/// The deployment serves one person; the schema keeps the column so the data
/// matches the upstream journal tables.
pub const USER_ID: i64 = 1;

const DAY_FORMAT: &str = "%Y-%m-%d";

const ENTRIES_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS entries (
    user_id INTEGER NOT NULL,
    day TEXT NOT NULL,
    body TEXT NOT NULL,
    UNIQUE (user_id, day)
)";

const PROMPTS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS prompts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    day TEXT NOT NULL,
    message_id TEXT NOT NULL,
    user_id INTEGER NOT NULL
)";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored day failed to parse: {0}")]
    DayParse(#[from] chrono::ParseError),
}

/// Journal entries keyed by calendar day. One row per day per user; a repeat
/// write for the same day overwrites (last write wins).
#[derive(Debug, Clone)]
pub struct EntryStore {
    path: PathBuf,
}

impl EntryStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into() };
        let conn = store.open()?;
        conn.execute(ENTRIES_SCHEMA, [])?;
        Ok(store)
    }

    pub fn upsert_entry(&self, day: NaiveDate, body: &str) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO entries (user_id, day, body) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, day) DO UPDATE SET body = excluded.body",
            params![USER_ID, format_day(day), body],
        )?;
        Ok(())
    }

    pub fn entry_body(&self, day: NaiveDate) -> Result<Option<String>, StoreError> {
        let conn = self.open()?;
        let body = conn
            .query_row(
                "SELECT body FROM entries WHERE user_id = ?1 AND day = ?2",
                params![USER_ID, format_day(day)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    pub fn count_entries(&self) -> Result<u64, StoreError> {
        let conn = self.open()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE user_id = ?1",
            params![USER_ID],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Entry at `offset` in ascending day order; powers uniform random
    /// selection without loading the whole journal.
    pub fn entry_at_offset(&self, offset: u64) -> Result<Option<(NaiveDate, String)>, StoreError> {
        let conn = self.open()?;
        let row = conn
            .query_row(
                "SELECT day, body FROM entries WHERE user_id = ?1
                 ORDER BY day LIMIT 1 OFFSET ?2",
                params![USER_ID, offset as i64],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        match row {
            Some((day_raw, body)) => Ok(Some((parse_day(&day_raw)?, body))),
            None => Ok(None),
        }
    }

    pub fn list_entry_days(&self) -> Result<Vec<NaiveDate>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT day FROM entries WHERE user_id = ?1 ORDER BY day",
        )?;
        let rows = stmt.query_map(params![USER_ID], |row| row.get::<_, String>(0))?;
        let mut days = Vec::new();
        for row in rows {
            days.push(parse_day(&row?)?);
        }
        Ok(days)
    }

    fn open(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.path)?)
    }
}

/// Audit trail of successfully sent prompts, one row appended per day sent.
/// The most recent day answers "where does the next catch-up pass start".
#[derive(Debug, Clone)]
pub struct PromptStore {
    path: PathBuf,
}

impl PromptStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { path: path.into() };
        let conn = store.open()?;
        conn.execute(PROMPTS_SCHEMA, [])?;
        Ok(store)
    }

    pub fn last_prompt_day(&self) -> Result<Option<NaiveDate>, StoreError> {
        let conn = self.open()?;
        let day = conn
            .query_row(
                "SELECT day FROM prompts WHERE user_id = ?1 ORDER BY day DESC LIMIT 1",
                params![USER_ID],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        match day {
            Some(raw) => Ok(Some(parse_day(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn record_prompt(&self, day: NaiveDate, message_id: &str) -> Result<(), StoreError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO prompts (day, message_id, user_id) VALUES (?1, ?2, ?3)",
            params![format_day(day), message_id, USER_ID],
        )?;
        Ok(())
    }

    fn open(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.path)?)
    }
}

fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

fn parse_day(raw: &str) -> Result<NaiveDate, StoreError> {
    Ok(NaiveDate::parse_from_str(raw, DAY_FORMAT)?)
}
