//! Error types for scrape-queue.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Dequeue found nothing waiting after exhausting its poll attempts.
    #[error("queue is empty")]
    EmptyQueue,

    /// The backing store could not be reached at startup.
    #[error("failed to connect to store: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
