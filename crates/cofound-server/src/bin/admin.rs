//! Operator tasks against the configured document store.
//!
//! Usage:
//!   cofound-admin copy --snapshot <path>
//!   cofound-admin export --output <path>
//!   cofound-admin dedupe [--symmetric]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cofound_server::{
    config::StoreBackend,
    db::{open_store, persist, MemoryStore},
    services::maintenance::{copy_documents, export_snapshot, merge_duplicate_requests},
    Config,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cofound-admin")]
#[command(about = "Maintenance tasks for the Cofound document store", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy every document from a JSON snapshot into the configured store
    Copy {
        /// Snapshot file in `{collection: {id: fields}}` form
        #[arg(short, long)]
        snapshot: PathBuf,
    },
    /// Write the configured store out as a JSON snapshot
    Export {
        /// Where to write the snapshot
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Collapse duplicate connection requests
    Dedupe {
        /// Treat A->B and B->A as the same pair
        #[arg(long, env = "SYMMETRIC_DEDUP")]
        symmetric: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cofound_server=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let writes = !matches!(args.command, Command::Export { .. });
    if writes && config.store == StoreBackend::Memory && config.snapshot_path.is_none() {
        anyhow::bail!("SNAPSHOT_PATH must be set to change the memory store");
    }
    let db = open_store(&config).await?;

    match args.command {
        Command::Copy { snapshot } => {
            let source = MemoryStore::load(&snapshot)
                .await
                .with_context(|| format!("reading {}", snapshot.display()))?;
            let report = copy_documents(&source, db.as_ref()).await;
            persist(&config, db.as_ref()).await?;
            println!("Copied {} documents, {} failed", report.copied, report.failed);
        }
        Command::Export { output } => {
            let snapshot = export_snapshot(db.as_ref()).await?;
            tokio::fs::write(&output, serde_json::to_string_pretty(&snapshot)?)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Snapshot written to {}", output.display());
        }
        Command::Dedupe { symmetric } => {
            let report = merge_duplicate_requests(db.as_ref(), symmetric).await?;
            persist(&config, db.as_ref()).await?;
            println!(
                "Merged {} duplicate groups, removed {} requests",
                report.groups, report.removed
            );
        }
    }

    Ok(())
}
