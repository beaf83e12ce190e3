//! # scrape-queue
//!
//! Persistent FIFO work queue for resource identifiers, with an
//! append-only audit trail of every transition.
//!
//! Items move `waiting -> in_progress -> (removed)`. Storage is Postgres
//! ([`db::Db`]) in production and SQLite ([`storage::Storage`]) locally
//! and in tests; both sit behind the [`store::Store`] trait.

pub mod audit;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod queue;
pub mod record;
pub mod storage;
pub mod store;
pub mod telemetry;

pub use error::{Error, Result};
pub use queue::{DequeueResult, PollPolicy, WorkQueue};
