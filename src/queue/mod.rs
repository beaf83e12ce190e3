//! The work queue: enqueue, dequeue, finish.
//!
//! Entries move `waiting -> in_progress -> (removed)` and never back. Every
//! successful transition appends one record to the [`AuditLog`].
//!
//! # Limitations
//!
//! There is no lease. An entry handed out by [`WorkQueue::dequeue`] stays
//! `in_progress` until someone calls [`WorkQueue::finish`]; if the consumer
//! dies in between, the item is never redelivered. Use
//! [`WorkQueue::state_counts`] to spot entries stuck in progress.

mod guard;
mod poll;

pub use guard::ClaimGuard;
pub use poll::{Backoff, PollPolicy};

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info, warn};

use crate::audit::AuditLog;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{InsertOutcome, Store};
use crate::telemetry::{metrics, queue as spans};

/// What a dequeue produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DequeueResult {
    /// This item is now in progress and belongs to the caller.
    Found(ItemId),
    /// Nothing was waiting during any poll attempt.
    Empty,
}

impl DequeueResult {
    /// The claimed id, or [`Error::EmptyQueue`].
    pub fn found(self) -> Result<ItemId> {
        match self {
            DequeueResult::Found(id) => Ok(id),
            DequeueResult::Empty => Err(Error::EmptyQueue),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, DequeueResult::Empty)
    }
}

/// FIFO work queue over a [`Store`].
///
/// Build one per process and share it (`Arc<WorkQueue>`); the claim guard
/// only coordinates callers of the same instance. Queues that write to the
/// same store from one process must share one [`Clock`].
pub struct WorkQueue<S: ?Sized = dyn Store> {
    store: Arc<S>,
    clock: Arc<Clock>,
    audit: AuditLog<S>,
    guard: ClaimGuard,
    poll: PollPolicy,
}

impl<S: Store + ?Sized> WorkQueue<S> {
    pub fn new(store: Arc<S>, clock: Arc<Clock>, poll: PollPolicy) -> Self {
        Self {
            audit: AuditLog::new(Arc::clone(&store), Arc::clone(&clock)),
            store,
            clock,
            guard: ClaimGuard::new(),
            poll,
        }
    }

    /// The audit trail this queue writes to.
    pub fn audit(&self) -> &AuditLog<S> {
        &self.audit
    }

    pub fn poll_policy(&self) -> &PollPolicy {
        &self.poll
    }

    /// Add `id` as a waiting entry.
    ///
    /// Returns `false`, with nothing written, if `id` is already in the
    /// queue in any state. The unique index on `id` makes that call, so
    /// concurrent enqueues of one id yield exactly one `true`.
    pub async fn enqueue(&self, id: impl Into<ItemId>) -> Result<bool> {
        let id = id.into();
        let span = spans::start_item_span("enqueue", &id);
        self.enqueue_inner(id).instrument(span).await
    }

    async fn enqueue_inner(&self, id: ItemId) -> Result<bool> {
        let entry = QueueEntry::waiting(id, self.clock.now());

        match self.store.insert_entry(&entry).await? {
            InsertOutcome::Duplicate => {
                warn!(id = %entry.id, "already enqueued");
                metrics::enqueued().add(1, &[KeyValue::new("result", "duplicate")]);
                Ok(false)
            }
            InsertOutcome::Inserted => {
                self.audit
                    .record_at(&entry.id, ActionKind::Enqueued, entry.enqueued_at)
                    .await?;
                metrics::enqueued().add(1, &[KeyValue::new("result", "ok")]);
                Ok(true)
            }
        }
    }

    /// Claim the oldest waiting entry.
    ///
    /// Polls up to [`PollPolicy::attempts`] times, sleeping the policy's
    /// backoff between empty attempts. The claim guard is held only for
    /// the claim itself, never across a sleep.
    pub async fn dequeue(&self) -> Result<DequeueResult> {
        let span = spans::start_dequeue_span();
        let started = Instant::now();

        let result = self.dequeue_inner(&span).instrument(span.clone()).await;

        if let Ok(ref outcome) = result {
            let label = if outcome.is_empty() { "empty" } else { "found" };
            metrics::dequeued().add(1, &[KeyValue::new("result", label)]);
            metrics::dequeue_wait_ms().record(
                started.elapsed().as_secs_f64() * 1000.0,
                &[KeyValue::new("result", label)],
            );
        }
        result
    }

    async fn dequeue_inner(&self, span: &tracing::Span) -> Result<DequeueResult> {
        let attempts = self.poll.attempts();
        for attempt in 1..=attempts {
            let claimed = {
                let _held = self.guard.acquire().await;
                self.store.claim_oldest().await?
            };

            if let Some(entry) = claimed {
                self.audit.record(&entry.id, ActionKind::Started).await?;
                spans::record_dequeue_outcome(span, attempt, Some(&entry.id));
                debug!(id = %entry.id, attempt, "dequeued");
                return Ok(DequeueResult::Found(entry.id));
            }

            if attempt < attempts {
                tokio::time::sleep(self.poll.delay_for_attempt(attempt)).await;
            }
        }

        spans::record_dequeue_outcome(span, attempts, None);
        let counts = self.store.state_counts().await?;
        debug!(
            waiting = counts.waiting,
            in_progress = counts.in_progress,
            attempts,
            "dequeue miss"
        );
        Ok(DequeueResult::Empty)
    }

    /// Remove the entry for `id`, whatever its state.
    ///
    /// A `finished` record is appended either way. Returns whether an entry
    /// was actually removed; an absent id is not an error.
    ///
    /// Not ordered against a concurrent `dequeue` of the same id: the
    /// delete can land between the claim and its `started` record, which
    /// then follows `finished` in the history.
    pub async fn finish(&self, id: impl Into<ItemId>) -> Result<bool> {
        let id = id.into();
        let span = spans::start_item_span("finish", &id);
        self.finish_inner(id).instrument(span).await
    }

    async fn finish_inner(&self, id: ItemId) -> Result<bool> {
        let before = self.store.count_entries(&id).await?;
        let removed = self.store.remove_entry(&id).await?;
        let after = self.store.count_entries(&id).await?;
        info!(id = %id, removed, before, after, "finish");

        self.audit.record(&id, ActionKind::Finished).await?;

        let label = if removed == 0 { "absent" } else { "removed" };
        metrics::finished().add(1, &[KeyValue::new("result", label)]);
        Ok(removed > 0)
    }

    /// Whether `id` is in the queue, waiting or in progress.
    pub async fn is_enqueued(&self, id: &ItemId) -> Result<bool> {
        Ok(self.store.count_entries(id).await? > 0)
    }

    /// The entry for `id`, if any.
    pub async fn entry(&self, id: &ItemId) -> Result<Option<QueueEntry>> {
        self.store.get_entry(id).await
    }

    pub async fn state_counts(&self) -> Result<StateCounts> {
        self.store.state_counts().await
    }

    /// Row counts of the queue, record, and action collections.
    pub async fn totals(&self) -> Result<StoreTotals> {
        self.store.totals().await
    }
}
