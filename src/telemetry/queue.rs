//! Queue operation span helpers.

use tracing::Span;

use crate::model::ItemId;

/// Start a span for one dequeue call.
///
/// `queue.attempts` and `queue.item` are declared empty and filled in by
/// [`record_dequeue_outcome`].
pub fn start_dequeue_span() -> Span {
    tracing::info_span!(
        "queue.dequeue",
        "queue.attempts" = tracing::field::Empty,
        "queue.item" = tracing::field::Empty,
    )
}

/// Record how many attempts a dequeue took and which item it claimed.
pub fn record_dequeue_outcome(span: &Span, attempts: u32, item: Option<&ItemId>) {
    span.record("queue.attempts", attempts);
    if let Some(id) = item {
        span.record("queue.item", tracing::field::display(id));
    }
}

/// Start a span for an operation on a single item (enqueue, finish).
pub fn start_item_span(operation: &'static str, id: &ItemId) -> Span {
    tracing::info_span!("queue.item", "queue.operation" = operation, "queue.item" = %id)
}
