use crate::store::{MemoryStore, PgStore, RecordStore};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

/// Connect to Postgres, or fall back to an in-memory store when no DSN is set.
pub(super) async fn open(dsn: Option<&str>) -> Result<Arc<dyn RecordStore>> {
    let Some(dsn) = dsn else {
        warn!("no --dsn given, records are kept in memory and lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    info!(dsn = %redact_dsn(dsn), "connected to database");

    Ok(Arc::new(PgStore::new(pool)))
}

pub(super) fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}
