//! Record store seam.
//!
//! The core never talks to a database directly. Every read and write goes
//! through [`RecordStore`], which exposes the four logical collections
//! (`entities`, `templates`, `auth_attempts`, `sent_logs`) as typed operations
//! instead of free-form filter strings.
//!
//! Two implementations ship with the crate:
//!
//! - [`PgStore`] keeps the collections in Postgres and is what `glas server`
//!   uses when a DSN is configured.
//! - [`MemoryStore`] keeps them behind a `tokio` lock. It backs the test suite
//!   and DSN-less local runs; nothing survives a restart.
//!
//! The only write with a concurrency contract is
//! [`RecordStore::transition_auth_attempt`]: it must behave as a
//! compare-and-swap on the attempt's state so that at most one caller moves a
//! given attempt out of `sent`.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use models::{
    AuthAttempt, AuthState, Entity, EntityKind, NewAuthAttempt, NewEntity, NewSentLog, SentLog,
    Template,
};
pub use postgres::PgStore;

use crate::privacy::MailHash;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("record {0} not found")]
    Missing(Uuid),
    #[error("unexpected record shape: {0}")]
    Shape(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All entities, or only those of `kind` when given.
    async fn list_entities(&self, kind: Option<EntityKind>) -> Result<Vec<Entity>, StoreError>;

    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>, StoreError>;

    /// Entities for `ids`, in the order of `ids`; unknown ids are skipped.
    async fn entities_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Entity>, StoreError>;

    async fn create_entity(&self, entity: &NewEntity) -> Result<Entity, StoreError>;

    /// Overwrite every field of entity `id`. Fails with `Missing` if absent.
    async fn update_entity(&self, id: Uuid, entity: &NewEntity) -> Result<(), StoreError>;

    /// Fails with `Missing` if absent.
    async fn delete_entity(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError>;

    async fn get_template(&self, id: Uuid) -> Result<Option<Template>, StoreError>;

    async fn create_auth_attempt(
        &self,
        attempt: &NewAuthAttempt,
    ) -> Result<AuthAttempt, StoreError>;

    /// Most recently created attempt for `mail_hash`, if it is still `sent`.
    /// Older attempts never come back once a newer one is consumed.
    async fn live_auth_attempt(
        &self,
        mail_hash: &MailHash,
    ) -> Result<Option<AuthAttempt>, StoreError>;

    /// Move attempt `id` from `from` to `to`. Returns `false` when the attempt
    /// was no longer in `from`, meaning another caller won the race.
    async fn transition_auth_attempt(
        &self,
        id: Uuid,
        from: AuthState,
        to: AuthState,
    ) -> Result<bool, StoreError>;

    /// True if any sent log for `mail_hash` was created strictly after `since`.
    async fn sent_log_exists_since(
        &self,
        mail_hash: &MailHash,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// True if `mail_hash` ever sent `template_id`.
    async fn sent_log_exists_for_template(
        &self,
        mail_hash: &MailHash,
        template_id: Uuid,
    ) -> Result<bool, StoreError>;

    async fn append_sent_log(&self, log: &NewSentLog) -> Result<SentLog, StoreError>;

    /// Cheap liveness check used by `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}
