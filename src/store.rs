//! Storage abstraction for the queue, the audit trail, and records.
//!
//! The queue is written against this trait so the same state machine runs
//! on Postgres in production ([`crate::db::Db`]) and on SQLite locally and
//! in tests ([`crate::storage::Storage`]). Each method is a single
//! statement against the backing store; the queue composes them.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::*;

/// Outcome of inserting a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The unique `id` index rejected the row.
    Duplicate,
}

/// Outcome of upserting a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Backing store operations.
///
/// Implementations must be thread-safe (Send + Sync) and must enforce the
/// unique indices themselves: the queue relies on them for duplicate
/// detection rather than checking first.
#[async_trait]
pub trait Store: Send + Sync {
    // ========== Queue ==========

    /// Insert a waiting entry. A duplicate `id` is reported, not raised.
    async fn insert_entry(&self, entry: &QueueEntry) -> Result<InsertOutcome>;

    /// Atomically pick the oldest waiting entry (by `enqueued_at`, then
    /// `id`), flip it to in-progress, and return it.
    ///
    /// Returns `None` if nothing is waiting.
    async fn claim_oldest(&self) -> Result<Option<QueueEntry>>;

    /// Get the entry for `id`, in either state.
    async fn get_entry(&self, id: &ItemId) -> Result<Option<QueueEntry>>;

    /// Count entries for `id` (0 or 1 while the unique index holds).
    async fn count_entries(&self, id: &ItemId) -> Result<u64>;

    /// Delete the entry for `id` regardless of state. Returns rows removed.
    async fn remove_entry(&self, id: &ItemId) -> Result<u64>;

    /// Number of entries per state.
    async fn state_counts(&self) -> Result<StateCounts>;

    // ========== Audit ==========

    /// Append an action record. Returns `false` if the unique
    /// `(id, at, kind)` index already held this exact record.
    async fn append_action(&self, action: &ActionRecord) -> Result<bool>;

    /// All actions for `id`, oldest first.
    async fn history(&self, id: &ItemId) -> Result<Vec<ActionRecord>>;

    /// Actions across all ids ordered by `(at, id, kind)`, at most `limit`
    /// rows. With `after`, only records whose key sorts strictly after it.
    async fn global_history(
        &self,
        after: Option<&ActionRecord>,
        limit: u32,
    ) -> Result<Vec<ActionRecord>>;

    // ========== Records ==========

    /// Count records stored under `key`.
    async fn count_records(&self, key: &str) -> Result<u64>;

    /// Get the record stored under `key`.
    async fn get_record(&self, key: &str) -> Result<Option<Record>>;

    /// Insert or replace the record keyed by `record.key`.
    async fn upsert_record(&self, record: &Record) -> Result<UpsertOutcome>;

    // ========== Stats ==========

    /// Row counts of queue, record, and action collections.
    async fn totals(&self) -> Result<StoreTotals>;
}
