//! importq CLI — operator interface to the import engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use importq::cluster::SoleOwner;
use importq::config::{Config, EngineConfig};
use importq::engine::{CreateResult, Manager};
use importq::handler::command::load_dir;
use importq::handler::HandlerRegistry;
use importq::model::{NewWorkRecord, Status};
use importq::store::postgres::PgStore;
use importq::store::WorkStore;
use importq::telemetry::init_telemetry;

#[derive(Parser)]
#[command(name = "importq", about = "Asynchronous import-entry processing engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the import engine daemon
    Serve {
        /// Directory containing handler TOML definitions
        #[arg(long, default_value = "handlers")]
        handlers: PathBuf,
        /// Engine tuning TOML (defaults apply when omitted)
        #[arg(long)]
        engine_config: Option<PathBuf>,
        /// Seconds to wait for detached work at shutdown
        #[arg(long, default_value_t = 10)]
        drain_secs: u64,
    },
    /// Work record operations
    Work {
        #[command(subcommand)]
        action: WorkAction,
    },
    /// Show queue depths per category and status
    Status,
}

#[derive(Subcommand)]
enum WorkAction {
    /// Create a new work record
    Submit {
        /// Category (selects the handler)
        category: String,
        /// Payload; "-" reads stdin
        payload: String,
        /// Producer-assigned id (idempotent re-submission)
        #[arg(long)]
        id: Option<String>,
    },
    /// List work records
    List {
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Filter by category
        #[arg(long)]
        category: Option<String>,
        /// Maximum records to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show a work record
    Show {
        /// Record id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            handlers,
            engine_config,
            drain_secs,
        } => cmd_serve(handlers, engine_config, drain_secs).await,
        Command::Work { action } => {
            let store = connect().await?;
            match action {
                WorkAction::Submit {
                    category,
                    payload,
                    id,
                } => cmd_work_submit(store, category, payload, id).await,
                WorkAction::List {
                    status,
                    category,
                    limit,
                } => cmd_work_list(&store, status, category, limit).await,
                WorkAction::Show { id } => cmd_work_show(&store, id).await,
            }
        }
        Command::Status => {
            let store = connect().await?;
            cmd_status(&store).await
        }
    }
}

async fn connect() -> anyhow::Result<PgStore> {
    let config = Config::from_env()?;
    let store = PgStore::connect(config.database_url.expose_secret()).await?;
    store.migrate().await?;
    Ok(store)
}

async fn cmd_serve(
    handlers: PathBuf,
    engine_config: Option<PathBuf>,
    drain_secs: u64,
) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_telemetry(&config.log_level)?;

    let engine_config = match engine_config {
        Some(path) => EngineConfig::from_file(&path)?,
        None => EngineConfig::default(),
    };

    let store = PgStore::connect(config.database_url.expose_secret()).await?;
    store.migrate().await?;

    let mut registry = HandlerRegistry::new();
    let registered = load_dir(&handlers, &mut registry)?;
    info!(handlers = registered, "handlers registered");

    let manager = Manager::new(
        Arc::new(store),
        Arc::new(SoleOwner),
        Arc::new(registry),
        engine_config,
    );
    manager.start();

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
    manager.shutdown();
    if !manager.wait_detached(Duration::from_secs(drain_secs)).await {
        warn!("timed out waiting for detached work, abandoning it");
    }

    Ok(())
}

async fn cmd_work_submit(
    store: PgStore,
    category: String,
    payload: String,
    id: Option<String>,
) -> anyhow::Result<()> {
    let payload = if payload == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        payload
    };

    // A disabled manager is the plain producer API: records persist here
    // and the serve process picks them up at its next poll tick.
    let manager = Manager::new(
        Arc::new(store),
        Arc::new(SoleOwner),
        Arc::new(HandlerRegistry::new()),
        EngineConfig {
            enabled: false,
            ..EngineConfig::default()
        },
    );

    let mut new = NewWorkRecord::new(&category, payload).quiet();
    if let Some(id) = id {
        new = new.id(id);
    }

    match manager.create_work(new).await? {
        CreateResult::Created(record) => {
            println!("Created: {} (status: {})", record.id, record.status);
        }
        CreateResult::Duplicate(id) => {
            println!("Exists: {id} (unchanged)");
        }
    }

    Ok(())
}

async fn cmd_work_list(
    store: &PgStore,
    status: Option<String>,
    category: Option<String>,
    limit: usize,
) -> anyhow::Result<()> {
    let status_filter: Option<Status> = match status {
        Some(s) => Some(
            s.parse()
                .map_err(|_| anyhow::anyhow!("invalid status: {s}"))?,
        ),
        None => None,
    };

    let records = store
        .list(status_filter, category.as_deref(), limit)
        .await?;

    if records.is_empty() {
        println!("No work records found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<10}  CREATED",
        "ID", "CATEGORY", "STATUS"
    );
    println!("{}", "-".repeat(84));

    for record in &records {
        let id = record.id.as_str();
        let id_display = if id.len() > 36 { &id[..36] } else { id };
        println!(
            "{:<36}  {:<16}  {:<10}  {}",
            id_display,
            record.category,
            record.status,
            record.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} record(s)", records.len());
    Ok(())
}

async fn cmd_work_show(store: &PgStore, id: String) -> anyhow::Result<()> {
    let record = store
        .get(&id.as_str().into())
        .await?
        .ok_or_else(|| anyhow::anyhow!("no work record with id '{id}'"))?;

    println!("ID:         {}", record.id);
    println!("Category:   {}", record.category);
    println!("Status:     {}", record.status);
    println!("Created:    {}", record.created_at);
    if let Some(processed) = record.processed_at {
        println!("Processed:  {processed}");
    }
    if let Some(ref error) = record.error_info {
        println!("Error:      {error}");
    }
    if let Some(ref response) = record.response_info {
        println!("Response:   {response}");
    }
    println!("---");
    println!("{}", record.payload);

    Ok(())
}

async fn cmd_status(store: &PgStore) -> anyhow::Result<()> {
    let counts = store.counts().await?;

    if counts.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!("{:<16}  {:<10}  COUNT", "CATEGORY", "STATUS");
    println!("{}", "-".repeat(40));
    for entry in &counts {
        println!(
            "{:<16}  {:<10}  {}",
            entry.category, entry.status, entry.count
        );
    }

    Ok(())
}
