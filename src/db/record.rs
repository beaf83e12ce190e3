//! Scraped record statements.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;
use crate::model::Record;
use crate::store::UpsertOutcome;

pub(super) async fn count(pool: &PgPool, key: &str) -> Result<u64> {
    let n: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scrapeq.record WHERE canonical_key = $1")
        .bind(key)
        .fetch_one(pool)
        .await?;
    Ok(n.0 as u64)
}

pub(super) async fn get(pool: &PgPool, key: &str) -> Result<Option<Record>> {
    let row: Option<(String, String, serde_json::Value, DateTime<Utc>)> = sqlx::query_as(
        "SELECT canonical_key, domain, payload, updated_at
         FROM scrapeq.record WHERE canonical_key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(key, domain, payload, updated_at)| Record {
        key,
        domain,
        payload,
        updated_at,
    }))
}

/// Replace by key. `xmax = 0` holds only for a freshly inserted tuple.
pub(super) async fn upsert(pool: &PgPool, record: &Record) -> Result<UpsertOutcome> {
    let (inserted,): (bool,) = sqlx::query_as(
        "INSERT INTO scrapeq.record (canonical_key, domain, payload, updated_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (canonical_key) DO UPDATE SET
             domain = EXCLUDED.domain,
             payload = EXCLUDED.payload,
             updated_at = EXCLUDED.updated_at
         RETURNING (xmax = 0)",
    )
    .bind(&record.key)
    .bind(&record.domain)
    .bind(&record.payload)
    .bind(record.updated_at)
    .fetch_one(pool)
    .await?;

    Ok(if inserted {
        UpsertOutcome::Inserted
    } else {
        UpsertOutcome::Replaced
    })
}
