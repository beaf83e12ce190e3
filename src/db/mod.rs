//! Postgres connection pool, migrations, and health check.
//!
//! `Db` is the production [`Store`]. Build it once at startup with
//! [`Db::open`] and share it behind an `Arc`; every queue, audit, and
//! record call goes through the same pool.

mod action;
mod queue;
mod record;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::*;
use crate::store::{InsertOutcome, Store, UpsertOutcome};

/// Database handle. Owns the connection pool.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    ///
    /// An unreachable server is reported as [`Error::Connect`].
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(Error::Connect)?;
        Ok(Self { pool })
    }

    /// Connect and bring the schema up to date. The one-call constructor
    /// used at process start.
    pub async fn open(config: &Config) -> Result<Self> {
        let db = Self::connect(config.database_url()?.expose_secret()).await?;
        db.migrate().await?;
        tracing::info!("store ready");
        Ok(db)
    }

    /// Create the schema, collections, and indices. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Round-trip a `SELECT 1`.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for Db {
    async fn insert_entry(&self, entry: &QueueEntry) -> Result<InsertOutcome> {
        queue::insert(self.pool(), entry).await
    }

    async fn claim_oldest(&self) -> Result<Option<QueueEntry>> {
        queue::claim_oldest(self.pool()).await
    }

    async fn get_entry(&self, id: &ItemId) -> Result<Option<QueueEntry>> {
        queue::get(self.pool(), id).await
    }

    async fn count_entries(&self, id: &ItemId) -> Result<u64> {
        queue::count(self.pool(), id).await
    }

    async fn remove_entry(&self, id: &ItemId) -> Result<u64> {
        queue::remove(self.pool(), id).await
    }

    async fn state_counts(&self) -> Result<StateCounts> {
        queue::state_counts(self.pool()).await
    }

    async fn append_action(&self, action: &ActionRecord) -> Result<bool> {
        action::append(self.pool(), action).await
    }

    async fn history(&self, id: &ItemId) -> Result<Vec<ActionRecord>> {
        action::for_item(self.pool(), id).await
    }

    async fn global_history(
        &self,
        after: Option<&ActionRecord>,
        limit: u32,
    ) -> Result<Vec<ActionRecord>> {
        action::global(self.pool(), after, limit).await
    }

    async fn count_records(&self, key: &str) -> Result<u64> {
        record::count(self.pool(), key).await
    }

    async fn get_record(&self, key: &str) -> Result<Option<Record>> {
        record::get(self.pool(), key).await
    }

    async fn upsert_record(&self, record: &Record) -> Result<UpsertOutcome> {
        record::upsert(self.pool(), record).await
    }

    async fn totals(&self) -> Result<StoreTotals> {
        let (queue, record, action): (i64, i64, i64) = sqlx::query_as(
            "SELECT
                 (SELECT COUNT(*) FROM scrapeq.queue),
                 (SELECT COUNT(*) FROM scrapeq.record),
                 (SELECT COUNT(*) FROM scrapeq.action)",
        )
        .fetch_one(self.pool())
        .await?;

        Ok(StoreTotals {
            queue: queue as u64,
            record: record as u64,
            action: action as u64,
        })
    }
}
