mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use medthread_store::config::StoreConfig;
use medthread_store::Database;

#[derive(Parser)]
#[command(name = "medthread", version, about = "Local clinical record storage")]
struct Cli {
    /// Path to config.toml (defaults to ~/.medthread/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Initialize storage and report the active engine and its health
    Status,
    /// Write a snapshot of the embedded database now
    Backup,
    /// Manage patient file attachments
    Files {
        #[command(subcommand)]
        action: FilesAction,
    },
    /// Export a patient's records as JSON to stdout
    Export {
        /// Patient id
        patient: String,
    },
}

#[derive(Subcommand)]
enum FilesAction {
    /// List a patient's files (metadata only)
    List { patient: String },
    /// Validate and store a file for a patient
    Store { patient: String, path: PathBuf },
    /// Write a stored file to disk
    Get { id: String, out: PathBuf },
    /// Delete a stored file
    Delete { id: String },
    /// File count and total size for a patient
    Stats { patient: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => StoreConfig::load_from(path)?,
        None => StoreConfig::load()?,
    };

    // Log to stderr so stdout stays clean for exports.
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let db = Database::new(config);

    let result = match cli.command {
        Command::Status => cli::status::status(&db).await,
        Command::Backup => cli::backup::backup(&db).await,
        Command::Files { action } => match action {
            FilesAction::List { patient } => cli::files::list(&db, &patient).await,
            FilesAction::Store { patient, path } => cli::files::store(&db, &patient, &path).await,
            FilesAction::Get { id, out } => cli::files::get(&db, &id, &out).await,
            FilesAction::Delete { id } => cli::files::delete(&db, &id).await,
            FilesAction::Stats { patient } => cli::files::stats(&db, &patient).await,
        },
        Command::Export { patient } => cli::export::export(&db, &patient).await,
    };

    // Persist whatever the command changed before exiting. A command error
    // takes precedence over a shutdown error.
    let shutdown = db.shutdown().await;
    result?;
    shutdown?;
    Ok(())
}
