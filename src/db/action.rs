//! Audit trail statements. Insert and select only.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;
use crate::model::*;

pub(super) async fn append(pool: &PgPool, action: &ActionRecord) -> Result<bool> {
    let inserted = sqlx::query(
        "INSERT INTO scrapeq.action (id, at, kind) VALUES ($1, $2, $3)
         ON CONFLICT DO NOTHING",
    )
    .bind(action.id.as_str())
    .bind(action.at)
    .bind(action.kind.as_str())
    .execute(pool)
    .await?
    .rows_affected();
    Ok(inserted == 1)
}

/// Served by `idx_action_id_at`.
pub(super) async fn for_item(pool: &PgPool, id: &ItemId) -> Result<Vec<ActionRecord>> {
    let rows: Vec<ActionRow> = sqlx::query_as(
        "SELECT id, at, kind FROM scrapeq.action
         WHERE id = $1
         ORDER BY at ASC,
                  CASE kind WHEN 'enqueued' THEN 0 WHEN 'started' THEN 1 ELSE 2 END ASC",
    )
    .bind(id.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ActionRow::try_into_action).collect()
}

/// Served by `idx_action_at_id`.
pub(super) async fn global(
    pool: &PgPool,
    after: Option<&ActionRecord>,
    limit: u32,
) -> Result<Vec<ActionRecord>> {
    let rows: Vec<ActionRow> = sqlx::query_as(
        "SELECT id, at, kind FROM scrapeq.action
         WHERE ($1::timestamptz IS NULL OR (at, id, kind) > ($1, $2::text, $3::text))
         ORDER BY at ASC, id ASC, kind ASC
         LIMIT $4",
    )
    .bind(after.map(|a| a.at))
    .bind(after.map(|a| a.id.as_str()))
    .bind(after.map(|a| a.kind.as_str()))
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(ActionRow::try_into_action).collect()
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: String,
    at: DateTime<Utc>,
    kind: String,
}

impl ActionRow {
    fn try_into_action(self) -> Result<ActionRecord> {
        Ok(ActionRecord {
            id: ItemId(self.id),
            at: self.at,
            kind: self.kind.parse()?,
        })
    }
}
