//! SQLite storage layer.
//!
//! Single-file (or in-memory) backend for local runs and tests. WAL mode
//! for concurrent readers. The connection sits behind a mutex, so every
//! statement, including the claim, runs alone.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{InsertOutcome, Store, UpsertOutcome};

/// Storage backend. Owns the SQLite connection.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS queue (
                id              TEXT NOT NULL,
                enqueued_at     TEXT NOT NULL,
                state           TEXT NOT NULL CHECK (state IN ('waiting', 'in_progress'))
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_id ON queue(id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_queue_state_ts ON queue(state, enqueued_at, id);

            CREATE TABLE IF NOT EXISTS action (
                id              TEXT NOT NULL,
                at              TEXT NOT NULL,
                kind            TEXT NOT NULL
            );

            -- per-item chronological order
            CREATE UNIQUE INDEX IF NOT EXISTS idx_action_id_at ON action(id, at, kind);
            -- global chronological order
            CREATE UNIQUE INDEX IF NOT EXISTS idx_action_at_id ON action(at, id, kind);

            CREATE TABLE IF NOT EXISTS record (
                canonical_key   TEXT NOT NULL,
                domain          TEXT NOT NULL,
                payload         TEXT NOT NULL DEFAULT '{}',
                updated_at      TEXT NOT NULL
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_record_key ON record(canonical_key);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_record_domain ON record(domain, canonical_key);
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("sqlite connection mutex poisoned".to_string()))
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Execute a closure within a SQLite transaction.
    ///
    /// The transaction commits if the closure returns Ok, rolls back on Err.
    fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

#[async_trait]
impl Store for Storage {
    async fn insert_entry(&self, entry: &QueueEntry) -> Result<InsertOutcome> {
        insert_entry_on(&*self.conn()?, entry)
    }

    async fn claim_oldest(&self) -> Result<Option<QueueEntry>> {
        claim_oldest_on(&*self.conn()?)
    }

    async fn get_entry(&self, id: &ItemId) -> Result<Option<QueueEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT id, enqueued_at, state FROM queue WHERE id = ?1",
                params![id.as_str()],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    async fn count_entries(&self, id: &ItemId) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM queue WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    async fn remove_entry(&self, id: &ItemId) -> Result<u64> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM queue WHERE id = ?1", params![id.as_str()])?;
        Ok(removed as u64)
    }

    async fn state_counts(&self) -> Result<StateCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT state, COUNT(*) FROM queue GROUP BY state")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut counts = StateCounts::default();
        for (state, n) in rows {
            match state.parse::<QueueState>()? {
                QueueState::Waiting => counts.waiting = n as u64,
                QueueState::InProgress => counts.in_progress = n as u64,
            }
        }
        Ok(counts)
    }

    async fn append_action(&self, action: &ActionRecord) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT INTO action (id, at, kind) VALUES (?1, ?2, ?3)
             ON CONFLICT DO NOTHING",
            params![action.id.as_str(), format_ts(&action.at), action.kind.as_str()],
        )?;
        Ok(inserted == 1)
    }

    async fn history(&self, id: &ItemId) -> Result<Vec<ActionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, at, kind FROM action WHERE id = ?1
             ORDER BY at ASC,
                      CASE kind WHEN 'enqueued' THEN 0 WHEN 'started' THEN 1 ELSE 2 END ASC",
        )?;
        let actions = stmt
            .query_map(params![id.as_str()], row_to_action)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(actions)
    }

    async fn global_history(
        &self,
        after: Option<&ActionRecord>,
        limit: u32,
    ) -> Result<Vec<ActionRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, at, kind FROM action
             WHERE ?1 IS NULL OR (at, id, kind) > (?1, ?2, ?3)
             ORDER BY at ASC, id ASC, kind ASC
             LIMIT ?4",
        )?;
        let cursor = (
            after.map(|a| format_ts(&a.at)),
            after.map(|a| a.id.as_str()),
            after.map(|a| a.kind.as_str()),
        );
        let actions = stmt
            .query_map(params![cursor.0, cursor.1, cursor.2, limit], row_to_action)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(actions)
    }

    async fn count_records(&self, key: &str) -> Result<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM record WHERE canonical_key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    async fn get_record(&self, key: &str) -> Result<Option<Record>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT canonical_key, domain, payload, updated_at FROM record WHERE canonical_key = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        parse_ts(&row.get::<_, String>(3)?, 3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(key, domain, payload, updated_at)| -> Result<Record> {
            Ok(Record {
                key,
                domain,
                payload: serde_json::from_str(&payload)?,
                updated_at,
            })
        })
        .transpose()
    }

    async fn upsert_record(&self, record: &Record) -> Result<UpsertOutcome> {
        let payload = serde_json::to_string(&record.payload)?;
        self.with_transaction(|tx| {
            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM record WHERE canonical_key = ?1",
                params![record.key],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO record (canonical_key, domain, payload, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(canonical_key) DO UPDATE SET
                     domain = excluded.domain,
                     payload = excluded.payload,
                     updated_at = excluded.updated_at",
                params![record.key, record.domain, payload, format_ts(&record.updated_at)],
            )?;

            Ok(if existing > 0 {
                UpsertOutcome::Replaced
            } else {
                UpsertOutcome::Inserted
            })
        })
    }

    async fn totals(&self) -> Result<StoreTotals> {
        let conn = self.conn()?;
        let count = |table: &str| -> Result<u64> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as u64)
        };
        Ok(StoreTotals {
            queue: count("queue")?,
            record: count("record")?,
            action: count("action")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Inner functions: accept &Connection so they work with both
// Connection (auto-commit) and Transaction (deref to Connection).
// ---------------------------------------------------------------------------

fn insert_entry_on(conn: &Connection, entry: &QueueEntry) -> Result<InsertOutcome> {
    let inserted = conn.execute(
        "INSERT INTO queue (id, enqueued_at, state) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO NOTHING",
        params![
            entry.id.as_str(),
            format_ts(&entry.enqueued_at),
            entry.state.as_str()
        ],
    )?;

    Ok(if inserted == 0 {
        InsertOutcome::Duplicate
    } else {
        InsertOutcome::Inserted
    })
}

fn claim_oldest_on(conn: &Connection) -> Result<Option<QueueEntry>> {
    let claimed = conn
        .query_row(
            "UPDATE queue SET state = 'in_progress'
             WHERE id = (
                 SELECT id FROM queue WHERE state = 'waiting'
                 ORDER BY enqueued_at ASC, id ASC
                 LIMIT 1
             )
             RETURNING id, enqueued_at, state",
            [],
            row_to_entry,
        )
        .optional()?;
    Ok(claimed)
}

// ---------------------------------------------------------------------------
// Row parsing helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 so text ordering equals time ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_col<T>(s: &str, col: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = Error>,
{
    s.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: ItemId(row.get(0)?),
        enqueued_at: parse_ts(&row.get::<_, String>(1)?, 1)?,
        state: parse_col(&row.get::<_, String>(2)?, 2)?,
    })
}

fn row_to_action(row: &rusqlite::Row) -> rusqlite::Result<ActionRecord> {
    Ok(ActionRecord {
        id: ItemId(row.get(0)?),
        at: parse_ts(&row.get::<_, String>(1)?, 1)?,
        kind: parse_col(&row.get::<_, String>(2)?, 2)?,
    })
}
