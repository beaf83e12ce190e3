//! Integration tests for telemetry initialization and span helpers.

use scrape_queue::model::ItemId;
use scrape_queue::telemetry::{TelemetryConfig, init_telemetry, queue};

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // This may return Err if another test already set one; that is acceptable.
    let config = TelemetryConfig {
        endpoint: None,
        service_name: "scrapeq-test".to_string(),
        log_level: "debug".to_string(),
    };
    if let Ok(guard) = init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn dequeue_span_records_outcome() {
    let span = queue::start_dequeue_span();
    queue::record_dequeue_outcome(&span, 3, Some(&ItemId::from("https://example.com")));
    queue::record_dequeue_outcome(&span, 10, None);
}

#[test]
fn item_span_creates() {
    let id = ItemId::from("https://example.com/item");
    let span = queue::start_item_span("enqueue", &id);
    let _entered = span.enter();
}
