//! Queue entry statements.

use sqlx::PgPool;

use crate::error::Result;
use crate::model::*;
use crate::store::InsertOutcome;

/// Insert a waiting entry. The unique index on `id` decides duplicates:
/// `ON CONFLICT DO NOTHING` returns no row when one already exists, so two
/// racing enqueues of the same id cannot both succeed.
pub(super) async fn insert(pool: &PgPool, entry: &QueueEntry) -> Result<InsertOutcome> {
    let inserted: Option<(String,)> = sqlx::query_as(
        "INSERT INTO scrapeq.queue (id, enqueued_at, state)
         VALUES ($1, $2, $3)
         ON CONFLICT (id) DO NOTHING
         RETURNING id",
    )
    .bind(entry.id.as_str())
    .bind(entry.enqueued_at)
    .bind(entry.state.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(match inserted {
        Some(_) => InsertOutcome::Inserted,
        None => InsertOutcome::Duplicate,
    })
}

/// Find-oldest-and-mark in one statement. `SKIP LOCKED` lets consumers in
/// other processes pass over a row another transaction is already flipping.
pub(super) async fn claim_oldest(pool: &PgPool) -> Result<Option<QueueEntry>> {
    let row: Option<EntryRow> = sqlx::query_as(
        "UPDATE scrapeq.queue SET state = 'in_progress'
         WHERE id = (
             SELECT id FROM scrapeq.queue
             WHERE state = 'waiting'
             ORDER BY enqueued_at ASC, id ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED
         )
         AND state = 'waiting'
         RETURNING id, enqueued_at, state",
    )
    .fetch_optional(pool)
    .await?;

    row.map(EntryRow::try_into_entry).transpose()
}

pub(super) async fn get(pool: &PgPool, id: &ItemId) -> Result<Option<QueueEntry>> {
    let row: Option<EntryRow> =
        sqlx::query_as("SELECT id, enqueued_at, state FROM scrapeq.queue WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(pool)
            .await?;

    row.map(EntryRow::try_into_entry).transpose()
}

pub(super) async fn count(pool: &PgPool, id: &ItemId) -> Result<u64> {
    let n: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scrapeq.queue WHERE id = $1")
        .bind(id.as_str())
        .fetch_one(pool)
        .await?;
    Ok(n.0 as u64)
}

pub(super) async fn remove(pool: &PgPool, id: &ItemId) -> Result<u64> {
    let removed = sqlx::query("DELETE FROM scrapeq.queue WHERE id = $1")
        .bind(id.as_str())
        .execute(pool)
        .await?
        .rows_affected();
    Ok(removed)
}

pub(super) async fn state_counts(pool: &PgPool) -> Result<StateCounts> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT state, COUNT(*) FROM scrapeq.queue GROUP BY state")
            .fetch_all(pool)
            .await?;

    let mut counts = StateCounts::default();
    for (state, n) in rows {
        match state.parse::<QueueState>()? {
            QueueState::Waiting => counts.waiting = n as u64,
            QueueState::InProgress => counts.in_progress = n as u64,
        }
    }
    Ok(counts)
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    enqueued_at: chrono::DateTime<chrono::Utc>,
    state: String,
}

impl EntryRow {
    fn try_into_entry(self) -> Result<QueueEntry> {
        Ok(QueueEntry {
            id: ItemId(self.id),
            enqueued_at: self.enqueued_at,
            state: self.state.parse()?,
        })
    }
}
