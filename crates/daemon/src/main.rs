//! qbankd warms the offline cache for the configured build generation.
//!
//! Run after a deploy (or from CI) to install the new generation's app
//! shell and prune every store left behind by earlier generations.
//! Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::Result;
use qbank_core::{AppConfig, CacheDb, Registry};
use qbank_daemon::{CacheDaemon, HttpBackend};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(generation = %config.generation, db_path = %config.db_path.display(), "starting cache warmup");

    let db = CacheDb::open(&config.db_path).await?;
    let backend = Arc::new(HttpBackend::new(&config)?);
    let registry = Arc::new(Registry::new());

    let daemon = CacheDaemon::register(config, db, backend, registry).await?;

    for store in daemon.db().store_names().await? {
        let entries = daemon.db().count_entries(&store).await?;
        tracing::info!(store = %store, entries, "store ready");
    }

    tracing::info!(generation = %daemon.generation(), state = %daemon.state(), "cache warmup complete");
    Ok(())
}
