use super::store;
use crate::{
    cli::{commands::directory, telemetry::shutdown_tracer},
    directory::{EntitySynchronizer, ParliamentDirectory},
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: Option<String>,
    pub directory: directory::Options,
}

/// Run one full directory synchronization and exit.
/// # Errors
/// Returns an error if the store is unreachable or any category failed.
pub async fn execute(args: Args) -> Result<()> {
    let store = store::open(args.dsn.as_deref()).await?;
    let source = ParliamentDirectory::new(&args.directory.url, args.directory.timeout)
        .context("Failed to build directory client")?;
    let synchronizer =
        EntitySynchronizer::new(store, Arc::new(source), args.directory.sync_config());

    let result = synchronizer.run_full_sync().await;
    if let Ok(reports) = &result {
        let writes: usize = reports.iter().map(|report| report.writes()).sum();
        info!(categories = reports.len(), writes, "directory sync finished");
    }

    shutdown_tracer();
    result.map(|_| ())
}
