//! Metric instrument factories for scrape-queue.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"scrape-queue"` meter.
//! Without a configured provider the global no-op meter absorbs them.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for scrape-queue instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("scrape-queue")
}

/// Counter: enqueue calls.
/// Labels: `result` ("ok" | "duplicate").
pub fn enqueued() -> Counter<u64> {
    meter()
        .u64_counter("scrapeq.queue.enqueued")
        .with_description("Number of enqueue calls")
        .build()
}

/// Counter: dequeue calls.
/// Labels: `result` ("found" | "empty").
pub fn dequeued() -> Counter<u64> {
    meter()
        .u64_counter("scrapeq.queue.dequeued")
        .with_description("Number of dequeue calls")
        .build()
}

/// Counter: finish calls.
/// Labels: `result` ("removed" | "absent").
pub fn finished() -> Counter<u64> {
    meter()
        .u64_counter("scrapeq.queue.finished")
        .with_description("Number of finish calls")
        .build()
}

/// Counter: audit records appended.
/// Labels: `kind`.
pub fn audit_actions() -> Counter<u64> {
    meter()
        .u64_counter("scrapeq.audit.actions")
        .with_description("Number of audit records appended")
        .build()
}

/// Histogram: time a dequeue spent polling, in milliseconds.
/// Labels: `result`.
pub fn dequeue_wait_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("scrapeq.dequeue.wait_ms")
        .with_description("Time spent inside dequeue")
        .with_unit("ms")
        .build()
}

/// Counter: record upserts.
/// Labels: `result` ("inserted" | "replaced").
pub fn record_upserts() -> Counter<u64> {
    meter()
        .u64_counter("scrapeq.record.upserts")
        .with_description("Number of record upserts")
        .build()
}
