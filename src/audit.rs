//! Append-only audit trail of queue transitions.
//!
//! One [`ActionRecord`] per successful enqueue, dequeue, and finish. Records
//! are never updated or deleted. Two read orders are served by the two
//! unique indices on the action collection: per item by `(id, at, kind)`,
//! and global by `(at, id, kind)`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use tracing::warn;

use crate::clock::Clock;
use crate::error::Result;
use crate::model::{ActionKind, ActionRecord, ItemId};
use crate::store::Store;
use crate::telemetry::metrics;

/// Default page size for [`AuditLog::global_history`] callers.
pub const DEFAULT_PAGE: u32 = 100;

pub struct AuditLog<S: ?Sized = dyn Store> {
    store: Arc<S>,
    clock: Arc<Clock>,
}

impl<S: ?Sized> Clone for AuditLog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: Store + ?Sized> AuditLog<S> {
    pub fn new(store: Arc<S>, clock: Arc<Clock>) -> Self {
        Self { store, clock }
    }

    /// Append `kind` for `id`, stamped now.
    pub async fn record(&self, id: &ItemId, kind: ActionKind) -> Result<ActionRecord> {
        self.record_at(id, kind, self.clock.now()).await
    }

    /// Append with an explicit timestamp, so an enqueue's entry and its
    /// record share one.
    pub(crate) async fn record_at(
        &self,
        id: &ItemId,
        kind: ActionKind,
        at: DateTime<Utc>,
    ) -> Result<ActionRecord> {
        let action = ActionRecord {
            id: id.clone(),
            at,
            kind,
        };

        if self.store.append_action(&action).await? {
            metrics::audit_actions().add(1, &[KeyValue::new("kind", kind.as_str())]);
        } else {
            warn!(id = %id, kind = %kind, at = %at, "audit record already present");
        }
        Ok(action)
    }

    /// Every action for `id`, oldest first.
    pub async fn history(&self, id: &ItemId) -> Result<Vec<ActionRecord>> {
        self.store.history(id).await
    }

    /// Up to `limit` actions across all items, ordered by `(at, id, kind)`.
    /// Pass the last record of a page as `after` to get the next one.
    pub async fn global_history(
        &self,
        after: Option<&ActionRecord>,
        limit: u32,
    ) -> Result<Vec<ActionRecord>> {
        self.store.global_history(after, limit).await
    }

    /// Walk the whole ledger in pages.
    pub async fn replay(&self) -> Result<Vec<ActionRecord>> {
        let mut all: Vec<ActionRecord> = Vec::new();
        loop {
            let page = self.global_history(all.last(), DEFAULT_PAGE).await?;
            let full = page.len() == DEFAULT_PAGE as usize;
            all.extend(page);
            if !full {
                return Ok(all);
            }
        }
    }
}
