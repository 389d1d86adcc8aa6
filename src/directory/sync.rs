//! Roster reconciliation.
//!
//! Each category pass fetches the external roster, resolves listings in
//! throttled batches, transforms them into canonical entities and converges the
//! stored entities of that category onto the result, keyed by email:
//!
//! - stored but not incoming: delete
//! - both: update, only when some field differs
//! - incoming but not stored: create
//!
//! Item failures (fetch, transform, write) are logged, counted and skipped.
//! Only a failure to fetch the roster itself or to load the stored entities
//! aborts a pass, and it does so before any write.

use anyhow::{anyhow, Result};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::{Category, DirectoryError, DirectorySource};
use crate::store::{Entity, EntityKind, NewEntity, RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    batch_size: usize,
    batch_delay: Duration,
}

impl SyncConfig {
    /// Default config: 5 profiles per batch, 1s between batches.
    #[must_use]
    pub fn new() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_secs(1),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    #[must_use]
    pub fn batch_delay(&self) -> Duration {
        self.batch_delay
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome counts of one category pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub kind: EntityKind,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    /// Incoming records lost to fetch, decode or transform failures, or to a
    /// duplicate email.
    pub dropped: usize,
    /// Store writes that failed.
    pub failed: usize,
}

impl SyncReport {
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            created: 0,
            updated: 0,
            deleted: 0,
            unchanged: 0,
            dropped: 0,
            failed: 0,
        }
    }

    #[must_use]
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

pub struct EntitySynchronizer {
    store: Arc<dyn RecordStore>,
    source: Arc<dyn DirectorySource>,
    config: SyncConfig,
}

impl EntitySynchronizer {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        source: Arc<dyn DirectorySource>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
        }
    }

    /// Fetch and transform the external roster of `category`. Returns the
    /// canonical entities and how many listings were dropped along the way.
    ///
    /// # Errors
    /// Returns an error only if the roster itself cannot be fetched.
    pub async fn fetch(&self, category: Category) -> Result<(Vec<NewEntity>, usize), SyncError> {
        let roster = self.source.roster(category).await?;
        let total = roster.listings.len();
        let mut dropped = roster.malformed;
        let mut entities = Vec::with_capacity(total);

        let batch_size = self.config.batch_size();
        for (index, batch) in roster.listings.chunks(batch_size).enumerate() {
            let results = join_all(batch.iter().map(|listing| self.source.resolve(listing))).await;

            for (listing, result) in batch.iter().zip(results) {
                match result.map(super::DirectoryRecord::into_entity) {
                    Ok(Ok(entity)) => entities.push(entity),
                    Ok(Err(err)) => {
                        warn!(%category, "dropping directory record: {err}");
                        dropped += 1;
                    }
                    Err(err) => {
                        warn!(%category, listing_id = listing.id(), "could not resolve listing: {err}");
                        dropped += 1;
                    }
                }
            }

            let processed = (index + 1) * batch_size;
            if processed < total {
                info!(%category, processed, total, "directory batch processed");
                sleep(self.config.batch_delay()).await;
            }
        }

        Ok((entities, dropped))
    }

    /// Converge the stored entities of `kind` onto `incoming`.
    ///
    /// # Errors
    /// Returns an error if the stored roster cannot be loaded. Individual write
    /// failures are counted in the report instead.
    pub async fn reconcile(
        &self,
        kind: EntityKind,
        incoming: Vec<NewEntity>,
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::new(kind);

        let mut seen = HashSet::new();
        let mut wanted = Vec::with_capacity(incoming.len());
        for entity in incoming {
            if seen.insert(entity.email.clone()) {
                wanted.push(entity);
            } else {
                warn!(%kind, "dropping duplicate directory email");
                report.dropped += 1;
            }
        }

        let stored = self.store.list_entities(Some(kind)).await?;
        let mut by_email: HashMap<&str, &Entity> = HashMap::with_capacity(stored.len());
        let mut stale: Vec<&Entity> = Vec::new();
        for entity in &stored {
            if by_email.contains_key(entity.email.as_str()) || !seen.contains(&entity.email) {
                stale.push(entity);
            } else {
                by_email.insert(entity.email.as_str(), entity);
            }
        }

        for entity in stale {
            match self.store.delete_entity(entity.id).await {
                Ok(()) => report.deleted += 1,
                Err(err) => {
                    error!(entity_id = %entity.id, "failed to delete stale entity: {err}");
                    report.failed += 1;
                }
            }
        }

        for draft in &wanted {
            match by_email.get(draft.email.as_str()) {
                Some(existing) if existing.matches(draft) => report.unchanged += 1,
                Some(existing) => match self.store.update_entity(existing.id, draft).await {
                    Ok(()) => report.updated += 1,
                    Err(err) => {
                        error!(entity_id = %existing.id, "failed to update entity: {err}");
                        report.failed += 1;
                    }
                },
                None => match self.store.create_entity(draft).await {
                    Ok(_) => report.created += 1,
                    Err(err) => {
                        error!(%kind, "failed to create entity: {err}");
                        report.failed += 1;
                    }
                },
            }
        }

        Ok(report)
    }

    /// Fetch then reconcile one category.
    ///
    /// # Errors
    /// Returns an error if the roster or the stored entities cannot be loaded;
    /// nothing is written in that case.
    pub async fn sync_category(&self, category: Category) -> Result<SyncReport, SyncError> {
        let (incoming, dropped) = self.fetch(category).await?;
        let mut report = self.reconcile(category.kind(), incoming).await?;
        report.dropped += dropped;
        info!(
            %category,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            unchanged = report.unchanged,
            dropped = report.dropped,
            failed = report.failed,
            "directory sync pass complete"
        );
        Ok(report)
    }

    /// Sync every category in turn. A failing category does not stop the
    /// next one.
    ///
    /// # Errors
    /// Returns an error after all passes ran if any of them failed.
    pub async fn run_full_sync(&self) -> Result<Vec<SyncReport>> {
        info!("starting full entity synchronization");
        let mut reports = Vec::with_capacity(Category::ALL.len());
        let mut failures = Vec::new();

        for category in Category::ALL {
            match self.sync_category(category).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    error!(%category, "directory sync pass failed: {err}");
                    failures.push(category.to_string());
                }
            }
        }

        if failures.is_empty() {
            info!("full entity synchronization complete");
            Ok(reports)
        } else {
            Err(anyhow!(
                "directory sync failed for: {}",
                failures.join(", ")
            ))
        }
    }
}

/// Spawn a background task that runs a full sync every `interval`.
pub fn spawn_sync_worker(
    synchronizer: Arc<EntitySynchronizer>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(err) = synchronizer.run_full_sync().await {
                error!("periodic directory sync failed: {err}");
            }

            sleep(interval).await;
        }
    })
}
