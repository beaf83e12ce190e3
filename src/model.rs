//! Core data model.
//!
//! A queue entry is a resource identifier waiting to be worked on, or being
//! worked on. An action record is one line of the append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Item ID
// ---------------------------------------------------------------------------

/// Identifier of a unit of work (typically a URL). Opaque to the queue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// Queue Entry
// ---------------------------------------------------------------------------

/// An item currently held by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique across all entries, in either state.
    pub id: ItemId,

    /// FIFO ordering key. Assigned once at enqueue time.
    pub enqueued_at: DateTime<Utc>,

    pub state: QueueState,
}

impl QueueEntry {
    /// A fresh waiting entry.
    pub fn waiting(id: ItemId, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id,
            enqueued_at,
            state: QueueState::Waiting,
        }
    }
}

/// Lifecycle state of a queue entry.
///
/// Finished entries are removed, so "done" has no variant here; it only
/// shows up in the audit trail as [`ActionKind::Finished`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Enqueued, waiting for a consumer.
    Waiting,
    /// Handed to a consumer by dequeue.
    InProgress,
}

impl QueueState {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueState::Waiting => "waiting",
            QueueState::InProgress => "in_progress",
        }
    }
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(QueueState::Waiting),
            "in_progress" => Ok(QueueState::InProgress),
            _ => Err(Error::Other(format!("unknown state: {s}"))),
        }
    }
}

/// Number of queue entries in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub waiting: u64,
    pub in_progress: u64,
}

impl StateCounts {
    pub fn total(&self) -> u64 {
        self.waiting + self.in_progress
    }
}

// ---------------------------------------------------------------------------
// Action Record
// ---------------------------------------------------------------------------

/// One audit trail event. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ItemId,
    pub at: DateTime<Utc>,
    pub kind: ActionKind,
}

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Enqueued,
    Started,
    Finished,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Enqueued => "enqueued",
            ActionKind::Started => "started",
            ActionKind::Finished => "finished",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "enqueued" => Ok(ActionKind::Enqueued),
            "started" => Ok(ActionKind::Started),
            "finished" => Ok(ActionKind::Finished),
            _ => Err(Error::Other(format!("unknown action kind: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A scraped payload, keyed by its canonical identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Canonical identifier (e.g. canonical URL). Unique.
    pub key: String,

    /// Site the record was scraped from.
    pub domain: String,

    /// Arbitrary scraped data. Opaque to the store.
    pub payload: serde_json::Value,

    pub updated_at: DateTime<Utc>,
}

/// Row counts of the three collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTotals {
    pub queue: u64,
    pub record: u64,
    pub action: u64,
}

impl std::fmt::Display for StoreTotals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Queue# {}  Record# {}  Action# {}",
            self.queue, self.record, self.action
        )
    }
}
