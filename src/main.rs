//! courier - scheduled message delivery engine.
//!
//! Usage:
//!   courier serve                 Run the engine and HTTP API
//!   courier validate-cron <EXPR>  Check a cron expression and preview occurrences

use clap::{Parser, Subcommand};
use courier::api::{self, ApiConfig, ApiState};
use courier::dispatch::WebhookDispatcher;
use courier::scheduler::ScheduleEngine;
use courier::storage::{HistoryRecorder, InMemoryStore, JobStore};
use courier::Schedule;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// courier - scheduled message delivery engine
#[derive(Parser)]
#[command(name = "courier")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine and HTTP API
    Serve {
        /// Path to the SQLite database file
        #[arg(long, default_value = "courier.db")]
        db: PathBuf,

        /// Use an in-memory store instead of SQLite (state is lost on exit)
        #[arg(long)]
        ephemeral: bool,

        /// Host to bind the API to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind the API to
        #[arg(long, default_value = "8790")]
        port: u16,
    },

    /// Check a cron expression and preview its next occurrences
    ValidateCron {
        /// Cron expression (5 or 6 fields)
        #[arg(value_name = "EXPR")]
        expression: String,

        /// Timezone to evaluate the expression in
        #[arg(long, default_value = "UTC")]
        timezone: String,

        /// How many occurrences to preview
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            db,
            ephemeral,
            host,
            port,
        } => {
            if ephemeral {
                let store = Arc::new(InMemoryStore::new());
                serve(store, host, port).await?;
            } else {
                #[cfg(feature = "sqlite")]
                {
                    info!("Opening database: {}", db.display());
                    let store = Arc::new(courier::storage::SqliteStore::new(&db).await?);
                    serve(store, host, port).await?;
                }
                #[cfg(not(feature = "sqlite"))]
                {
                    let _ = db;
                    return Err("built without the sqlite feature; use --ephemeral".into());
                }
            }
        }
        Commands::ValidateCron {
            expression,
            timezone,
            count,
        } => {
            validate_cron(&expression, &timezone, count)?;
        }
    }

    Ok(())
}

/// Reconcile stored jobs, then run the API until Ctrl+C.
async fn serve<S: JobStore + HistoryRecorder + 'static>(
    store: Arc<S>,
    host: String,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let dispatcher = Arc::new(WebhookDispatcher::new()?);
    let engine = ScheduleEngine::start(store, dispatcher).await?;
    info!(armed = engine.armed_count(), "engine started");

    let state = ApiState::new(engine.clone());
    let mut server = api::start_server(ApiConfig::new(host, port), state).await?;

    info!("Press Ctrl+C to stop");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            engine.shutdown();
            server.abort();
        }
        _ = &mut server => {
            info!("API server stopped");
            engine.shutdown();
        }
    }

    info!("Goodbye!");
    Ok(())
}

/// Validate a cron expression and print its upcoming occurrences.
fn validate_cron(
    expression: &str,
    timezone: &str,
    count: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let schedule = Schedule::recurring_in(expression, timezone);
    schedule.ensure_parsable()?;

    let occurrences = schedule.next_n_after(chrono::Utc::now(), count)?;
    println!("'{}' in {} is valid", expression, timezone);
    println!("Next {} occurrence(s):", occurrences.len());
    for occurrence in occurrences {
        println!("  {}", occurrence.to_rfc3339());
    }

    Ok(())
}
