//! # Reconciliation CLI
//!
//! Runs one full reconciliation pass between the Embedded Store and the Durable Store
//! and prints the report as JSON. Per-record failures are reported, not fatal.

use anyhow::{bail, Context};
use axiant::{EmbeddedStore, Reconciler};
use axiant_server::{config::get_config, init_tracing, state::build_durable_pool};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Reconciles the embedded store with the durable store.")]
struct Cli {
    /// Path to a config file. Defaults to the server's `config.yml` lookup.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = get_config(cli.config.as_deref())?;
    if config.durable_store().is_none() {
        bail!("durable.uri is not configured (set AXIANT_DURABLE__URI); nothing to reconcile against.");
    }

    let embedded = EmbeddedStore::open(&config.embedded_db_path)
        .await
        .with_context(|| format!("Failed to open embedded store '{}'", config.embedded_db_path))?;
    let durable = build_durable_pool(&config);
    durable
        .open()
        .await
        .context("Failed to connect to the durable store")?;

    let report = Reconciler::new(embedded, durable.clone()).reconcile_all().await;
    durable.close().await;

    info!(
        clean = report.is_clean(),
        duration_ms = report.duration_ms,
        "Reconciliation finished."
    );
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
