//! Scraped record persistence: presence check and upsert by canonical key.

use std::sync::Arc;

use chrono::Utc;
use opentelemetry::KeyValue;
use tracing::{info, warn};

use crate::error::Result;
use crate::model::Record;
use crate::store::{Store, UpsertOutcome};
use crate::telemetry::metrics;

pub struct RecordStore<S: ?Sized = dyn Store> {
    store: Arc<S>,
}

impl<S: Store + ?Sized> RecordStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Whether a record exists under `key`.
    ///
    /// More than one match means the key index was bypassed; that is
    /// logged and the answer is still `true`.
    pub async fn has_record(&self, key: &str) -> Result<bool> {
        let n = self.store.count_records(key).await?;
        if n > 1 {
            warn!(key, matches = n, "found more than one record");
        }
        Ok(n > 0)
    }

    pub async fn record(&self, key: &str) -> Result<Option<Record>> {
        self.store.get_record(key).await
    }

    /// Insert or replace the record under `key`.
    pub async fn upsert_record(
        &self,
        key: impl Into<String>,
        domain: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<UpsertOutcome> {
        let record = Record {
            key: key.into(),
            domain: domain.into(),
            payload,
            updated_at: Utc::now(),
        };

        if self.has_record(&record.key).await? {
            warn!(key = %record.key, "updating existing record");
        }

        let outcome = self.store.upsert_record(&record).await?;
        let label = match outcome {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Replaced => "replaced",
        };
        metrics::record_upserts().add(1, &[KeyValue::new("result", label)]);
        info!(key = %record.key, result = label, "upserted record");
        Ok(outcome)
    }
}
