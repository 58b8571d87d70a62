//! Tierio CLI - Operator Command Line Interface
//!
//! This binary drives a Tierio engine built from a TOML configuration file:
//! store/fetch/remove payloads, inspect drive usage, and watch drive health.

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tierio_common::EngineConfig;
use tierio_engine::StorageEngine;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tierio")]
#[command(about = "Tierio storage engine CLI")]
#[command(version)]
struct Args {
    /// Path to the engine configuration file (TOML)
    #[arg(short, long, default_value = "tierio.toml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a file under a key
    Put {
        /// Storage key
        key: String,
        /// File whose contents to store
        file: PathBuf,
    },
    /// Fetch the payload stored under a key
    Get {
        /// Storage key
        key: String,
        /// Write the payload to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Remove the payload stored under a key
    Delete {
        /// Storage key
        key: String,
        /// Zero-overwrite contents before deleting
        #[arg(long)]
        secure: bool,
    },
    /// Show per-drive usage
    Status,
    /// Run a health sampling pass
    Health {
        /// Keep sampling and print every snapshot until interrupted
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&args.config)?;
    let engine = StorageEngine::new(config)?;
    let cancel = CancellationToken::new();

    match args.command {
        Commands::Put { key, file } => {
            let data = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let size = data.len();
            engine
                .executor()
                .save(&key, Bytes::from(data), &cancel)
                .await?;
            println!("stored {key} ({size} bytes)");
        }
        Commands::Get { key, out } => {
            let data = engine.executor().load(&key, &cancel).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, &data)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("wrote {} bytes to {}", data.len(), path.display());
                }
                None => {
                    use std::io::Write;
                    std::io::stdout().write_all(&data)?;
                }
            }
        }
        Commands::Delete { key, secure } => {
            let secure = secure || engine.executor().secure_default();
            engine.executor().delete(&key, secure, &cancel).await?;
            println!("deleted {key}");
        }
        Commands::Status => {
            println!(
                "{:<40} {:>6} {:>8} {:>14} {:>14} {:>14} {:>8}",
                "DRIVE", "PAIR", "ROLE", "TOTAL", "AVAILABLE", "USED", "WRITES"
            );
            for usage in engine.pool().snapshot() {
                println!(
                    "{:<40} {:>6} {:>8} {:>14} {:>14} {:>14} {:>8}",
                    usage.path.display(),
                    usage.drive_number,
                    usage.role.to_string(),
                    usage.total_space,
                    usage.available_space,
                    usage.used_space,
                    usage.write_count
                );
            }
        }
        Commands::Health { watch } => {
            let retention = std::time::Duration::from_secs(
                engine.config().monitor.retention_period_secs,
            );
            if watch {
                let _subscription = engine.monitor().subscribe(|snapshot, message| {
                    println!(
                        "{:<40} {:>7.1}% {:>9} {}",
                        snapshot.drive.display(),
                        snapshot.usage_pct,
                        snapshot.status.as_str(),
                        message.unwrap_or("")
                    );
                });
                engine.start_monitor()?;
                tokio::signal::ctrl_c().await?;
                engine.shutdown().await;
            } else {
                for snapshot in engine.monitor().sample_now(retention) {
                    println!(
                        "{:<40} {:>7.1}% {:>9}",
                        snapshot.drive.display(),
                        snapshot.usage_pct,
                        snapshot.status.as_str()
                    );
                }
            }
        }
    }

    Ok(())
}

fn load_config(path: &PathBuf) -> Result<EngineConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.clone()))
        .build()
        .with_context(|| format!("loading {}", path.display()))?;
    let config: EngineConfig = settings
        .try_deserialize()
        .context("invalid engine configuration")?;
    Ok(config)
}
