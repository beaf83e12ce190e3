//! scrapeq: operator CLI for the scrape queue.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scrape_queue::clock::Clock;
use scrape_queue::config::Config;
use scrape_queue::db::Db;
use scrape_queue::model::ItemId;
use scrape_queue::record::RecordStore;
use scrape_queue::storage::Storage;
use scrape_queue::store::{Store, UpsertOutcome};
use scrape_queue::telemetry::{TelemetryConfig, init_telemetry};
use scrape_queue::{DequeueResult, WorkQueue};

#[derive(Parser)]
#[command(name = "scrapeq", about = "Persistent FIFO work queue with an audit trail")]
struct Cli {
    /// Use a SQLite database file instead of Postgres
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add items to the queue
    Enqueue {
        /// Item identifiers (e.g. URLs)
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Claim the oldest waiting item and print its id
    Dequeue,
    /// Remove an item from the queue
    Finish {
        id: String,
    },
    /// Show the queue entry for an item
    Status {
        id: String,
    },
    /// Show the audit trail, for one item or for all
    History {
        id: Option<String>,
        /// Maximum actions to show (global history only)
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Per-state and per-collection counts
    Stats,
    /// Scraped record operations
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Insert or replace a record
    Put {
        /// Canonical identifier
        key: String,
        domain: String,
        /// JSON payload
        payload: String,
    },
    /// Check whether a record exists
    Has {
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "scrapeq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let store: Arc<dyn Store> = match cli.sqlite {
        Some(ref path) => Arc::new(Storage::open(path)?),
        None => Arc::new(Db::open(&config).await?),
    };
    let queue = WorkQueue::new(Arc::clone(&store), Arc::new(Clock::new()), config.poll);

    match cli.command {
        Command::Enqueue { ids } => cmd_enqueue(&queue, ids).await,
        Command::Dequeue => cmd_dequeue(&queue).await,
        Command::Finish { id } => cmd_finish(&queue, id).await,
        Command::Status { id } => cmd_status(&queue, id).await,
        Command::History { id, limit } => cmd_history(&queue, id, limit).await,
        Command::Stats => cmd_stats(&queue).await,
        Command::Record { action } => cmd_record(RecordStore::new(store), action).await,
    }
}

async fn cmd_enqueue(queue: &WorkQueue, ids: Vec<String>) -> anyhow::Result<ExitCode> {
    for id in ids {
        if queue.enqueue(id.as_str()).await? {
            println!("enqueued  {id}");
        } else {
            println!("present   {id}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_dequeue(queue: &WorkQueue) -> anyhow::Result<ExitCode> {
    match queue.dequeue().await? {
        DequeueResult::Found(id) => {
            println!("{id}");
            Ok(ExitCode::SUCCESS)
        }
        DequeueResult::Empty => {
            eprintln!("queue empty");
            Ok(ExitCode::from(2))
        }
    }
}

async fn cmd_finish(queue: &WorkQueue, id: String) -> anyhow::Result<ExitCode> {
    if queue.finish(id.as_str()).await? {
        println!("finished  {id}");
    } else {
        println!("absent    {id}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_status(queue: &WorkQueue, id: String) -> anyhow::Result<ExitCode> {
    let id = ItemId::from(id);
    match queue.entry(&id).await? {
        Some(entry) => {
            println!("ID:        {}", entry.id);
            println!("State:     {}", entry.state);
            println!("Enqueued:  {}", entry.enqueued_at);
        }
        None => println!("{id} is not in the queue"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_history(
    queue: &WorkQueue,
    id: Option<String>,
    limit: u32,
) -> anyhow::Result<ExitCode> {
    let actions = match id {
        Some(id) => queue.audit().history(&ItemId::from(id)).await?,
        None => queue.audit().global_history(None, limit).await?,
    };

    if actions.is_empty() {
        println!("No actions recorded.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<27}  {:<9}  ID", "AT", "ACTION");
    println!("{}", "-".repeat(80));
    for action in &actions {
        println!(
            "{:<27}  {:<9}  {}",
            action.at.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            action.kind,
            action.id
        );
    }
    println!("\n{} action(s)", actions.len());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_stats(queue: &WorkQueue) -> anyhow::Result<ExitCode> {
    let counts = queue.state_counts().await?;
    let totals = queue.totals().await?;
    println!("waiting:     {}", counts.waiting);
    println!("in_progress: {}", counts.in_progress);
    println!("{totals}");
    Ok(ExitCode::SUCCESS)
}

async fn cmd_record(records: RecordStore, action: RecordAction) -> anyhow::Result<ExitCode> {
    match action {
        RecordAction::Put {
            key,
            domain,
            payload,
        } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            match records.upsert_record(&key, domain, payload).await? {
                UpsertOutcome::Inserted => println!("inserted  {key}"),
                UpsertOutcome::Replaced => println!("replaced  {key}"),
            }
            Ok(ExitCode::SUCCESS)
        }
        RecordAction::Has { key } => {
            if records.has_record(&key).await? {
                println!("yes");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("no");
                Ok(ExitCode::from(1))
            }
        }
    }
}
