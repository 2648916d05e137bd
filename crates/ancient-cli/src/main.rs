//! Ancient store CLI (ancientctl)
//!
//! Operator tool for inspecting and maintaining a remote freezer service.
//!
//! ## Quick Start
//!
//! ```bash
//! export ANCIENT_ENDPOINT=http://localhost:9797
//!
//! # Frozen item count
//! ancientctl ancients
//!
//! # Read the header of block 1000
//! ancientctl get headers 1000
//!
//! # Read ten canonical hashes starting at 0, capped at 1 KiB
//! ancientctl range hashes 0 10 --max-bytes 1024
//!
//! # Drop everything above item 5000 (operator repair)
//! ancientctl truncate 5000
//! ```
//!
//! ## Configuration
//!
//! - `ANCIENT_ENDPOINT` / `--endpoint`: HTTP URL or local socket path
//! - `ANCIENT_PROFILE` / `--profile`: TOML profile with `endpoint`,
//!   `timeout_secs` and `output`
//!
//! Flags win over the profile; the endpoint falls back to
//! `http://localhost:9797`.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use ancient_client::{HttpTransport, RemoteFreezer, Transport};
use ancient_core::{AncientStore, Kind};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod config;
mod format;

use config::{Profile, DEFAULT_ENDPOINT};
use format::{OutputFormat, Reply};

#[derive(Debug, Parser)]
#[command(name = "ancientctl")]
#[command(about = "Inspect and maintain a remote ancient store", long_about = None)]
struct Cli {
    /// Freezer endpoint: http(s) URL or socket path
    #[arg(short, long, env = "ANCIENT_ENDPOINT")]
    endpoint: Option<String>,

    /// TOML connection profile
    #[arg(short, long, env = "ANCIENT_PROFILE")]
    profile: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    output: Option<OutputFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
enum Command {
    /// Print the frozen item count
    Ancients,
    /// Check whether an item is frozen
    Has {
        /// hashes, headers, bodies, receipts or diffs
        kind: Kind,
        number: u64,
    },
    /// Print one frozen blob
    Get { kind: Kind, number: u64 },
    /// Print consecutive frozen blobs
    Range {
        kind: Kind,
        start: u64,
        count: u64,
        /// Byte budget for the response, 0 for none
        #[arg(long, default_value = "0")]
        max_bytes: u64,
    },
    /// Print the stored size of a kind in bytes
    Size { kind: Kind },
    /// Discard every item at or above ITEMS
    Truncate { items: u64 },
    /// Make appended items durable
    Sync,
}

/// Endpoint and output settings after merging flags over the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    endpoint: String,
    timeout: Option<std::time::Duration>,
    output: OutputFormat,
}

impl Cli {
    fn settings(&self) -> Result<Settings> {
        let profile = match &self.profile {
            Some(path) => Profile::load(path)?,
            None => Profile::default(),
        };
        Ok(Settings {
            endpoint: self
                .endpoint
                .clone()
                .or_else(|| profile.endpoint.clone())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout: profile.timeout(),
            output: self.output.or(profile.output).unwrap_or_default(),
        })
    }
}

async fn connect(settings: &Settings) -> Result<RemoteFreezer> {
    let endpoint = settings.endpoint.as_str();
    let transport: Arc<dyn Transport> = match settings.timeout {
        Some(timeout) if endpoint.starts_with("http://") || endpoint.starts_with("https://") => {
            Arc::new(HttpTransport::with_timeout(endpoint, timeout)?)
        }
        _ => ancient_client::dial(endpoint)
            .await
            .with_context(|| format!("Failed to connect to {}", endpoint))?,
    };
    Ok(RemoteFreezer::new(transport))
}

/// Run one command against `store`.
async fn execute(store: &dyn AncientStore, command: Command) -> Result<Reply> {
    let reply = match command {
        Command::Ancients => Reply::Count(
            store
                .ancients()
                .await
                .context("Failed to read frozen count")?,
        ),
        Command::Has { kind, number } => Reply::Flag(
            store
                .has_ancient(kind, number)
                .await
                .with_context(|| format!("Failed to check {} {}", kind, number))?,
        ),
        Command::Get { kind, number } => Reply::Blob(
            store
                .ancient(kind, number)
                .await
                .with_context(|| format!("Failed to read {} {}", kind, number))?,
        ),
        Command::Range {
            kind,
            start,
            count,
            max_bytes,
        } => Reply::Blobs(
            store
                .ancient_range(kind, start, count, max_bytes)
                .await
                .with_context(|| format!("Failed to read {} from {}", kind, start))?,
        ),
        Command::Size { kind } => Reply::Count(
            store
                .ancient_size(kind)
                .await
                .with_context(|| format!("Failed to read size of {}", kind))?,
        ),
        Command::Truncate { items } => {
            store
                .truncate_ancients(items)
                .await
                .with_context(|| format!("Failed to truncate to {} items", items))?;
            Reply::Done(format!("Truncated freezer to {} items", items))
        }
        Command::Sync => {
            store.sync().await.context("Failed to sync freezer")?;
            Reply::Done("Freezer synced".to_string())
        }
    };
    Ok(reply)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = cli.settings()?;
    tracing::debug!(?settings, command = ?cli.command, "Running command");

    let remote = connect(&settings).await?;
    let result = execute(&remote, cli.command).await;
    if let Err(e) = remote.close().await {
        tracing::debug!(error = %e, "Failed to close connection");
    }

    let reply = result?;
    let mut stdout = std::io::stdout().lock();
    reply.write_to(settings.output, &mut stdout)?;
    stdout.flush()?;
    Ok(())
}
