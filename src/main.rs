// ABOUTME: Entry point for the ndnrepo binary.
// ABOUTME: Parses CLI arguments, initializes tracing, opens the repo, and runs until ctrl-c.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ndnrepo_core::Name;
use ndnrepo_server::testing::{MemoryFace, MemorySyncTransport};
use ndnrepo_server::{AppState, BulkInsertListener, DigestSha256Validator, RepoConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "ndnrepo", version, about = "Named-data repository daemon")]
struct Cli {
    /// Database directory (overrides NDNREPO_DB_DIR)
    #[arg(long)]
    db_dir: Option<PathBuf>,

    /// TCP address for bulk insert (overrides NDNREPO_BULK_INSERT_ADDR)
    #[arg(long)]
    bulk_insert_addr: Option<SocketAddr>,

    /// Sync group the in-process transport reports missing ranges for
    #[arg(long, default_value = "/ndn/repo/sync")]
    sync_group: String,
}

/// Runs the repo with in-process collaborators. Nothing here receives command
/// Interests: a host delivers them by calling `SyncHandle::on_interest` from its
/// own `Face` implementation, and fetches go through that same `Face`. Until
/// one is plugged in, storage and TCP bulk insert are the only live ingress.
#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ndnrepo=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = RepoConfig::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.db_dir {
        config.db_dir = dir;
    }
    if let Some(addr) = cli.bulk_insert_addr {
        config.bulk_insert_addr = Some(addr);
    }
    let sync_group = Name::from_uri(&cli.sync_group)
        .with_context(|| format!("invalid sync group {}", cli.sync_group))?;

    info!(prefix = %config.command_prefix, "ndnrepo starting up");

    let face = MemoryFace::new();
    let transport = MemorySyncTransport::with_face(sync_group, face.clone());
    let validator = Arc::new(DigestSha256Validator::new(config.command_prefix.clone()));

    let (state, mut sync_task) = AppState::open(config, face, validator, transport)
        .context("failed to open storage")?;

    let bulk_task = match state.config.bulk_insert_addr {
        Some(addr) => {
            let listener = BulkInsertListener::bind(addr, state.repo.clone()).await?;
            Some(tokio::spawn(listener.run()))
        }
        None => None,
    };

    let status = state.status().await?;
    info!(status = %serde_json::to_string(&status)?, "repo ready");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!("shutting down");
        }
        joined = &mut sync_task => {
            match joined {
                Ok(Ok(())) => info!("sync session manager exited"),
                Ok(Err(e)) => {
                    error!(error = %e, "sync session manager failed");
                    return Err(e.into());
                }
                Err(e) => return Err(e).context("sync session manager panicked"),
            }
        }
    }

    if let Some(task) = bulk_task {
        task.abort();
    }
    Ok(())
}
