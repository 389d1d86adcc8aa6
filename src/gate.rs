//! Send gate: per-sender rate limiting and per-template deduplication.
//!
//! `sent_logs` is the only source of truth. A sender is blocked for
//! `window` after any letter, whatever the template, and may never send the
//! same template twice. [`SendGate::record`] must only run once the letter has
//! been accepted by the mail transport.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::Fault;
use crate::privacy::MailHash;
use crate::store::{NewSentLog, RecordStore, SentLog, StoreError};

pub const DEFAULT_RATE_LIMIT_HOURS: i64 = 168;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Blocked,
}

#[derive(Clone)]
pub struct SendGate {
    store: Arc<dyn RecordStore>,
    window: Duration,
}

impl SendGate {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, window: Duration) -> Self {
        Self { store, window }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// # Errors
    /// Returns an error if the store cannot be queried.
    pub async fn check_rate_limit(&self, mail_hash: &MailHash) -> Result<GateDecision, StoreError> {
        self.check_rate_limit_at(mail_hash, Utc::now()).await
    }

    /// [`Self::check_rate_limit`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if the store cannot be queried.
    pub async fn check_rate_limit_at(
        &self,
        mail_hash: &MailHash,
        now: DateTime<Utc>,
    ) -> Result<GateDecision, StoreError> {
        let since = now - self.window;
        if self.store.sent_log_exists_since(mail_hash, since).await? {
            Ok(GateDecision::Blocked)
        } else {
            Ok(GateDecision::Allowed)
        }
    }

    /// # Errors
    /// Returns an error if the store cannot be queried.
    pub async fn check_duplicate(
        &self,
        mail_hash: &MailHash,
        template_id: Uuid,
    ) -> Result<GateDecision, StoreError> {
        if self
            .store
            .sent_log_exists_for_template(mail_hash, template_id)
            .await?
        {
            Ok(GateDecision::Blocked)
        } else {
            Ok(GateDecision::Allowed)
        }
    }

    /// Run both checks, rate limit first.
    ///
    /// # Errors
    /// `RateLimited`, `Duplicate`, or `Store` when the lookup fails.
    #[instrument(skip(self), fields(mail_hash = %mail_hash))]
    pub async fn admit(&self, mail_hash: &MailHash, template_id: Uuid) -> Result<(), Fault> {
        self.admit_at(mail_hash, template_id, Utc::now()).await
    }

    /// [`Self::admit`] with an explicit clock.
    ///
    /// # Errors
    /// `RateLimited`, `Duplicate`, or `Store` when the lookup fails.
    pub async fn admit_at(
        &self,
        mail_hash: &MailHash,
        template_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), Fault> {
        if self.check_rate_limit_at(mail_hash, now).await? == GateDecision::Blocked {
            debug!("sender inside rate limit window");
            return Err(Fault::RateLimited);
        }
        if self.check_duplicate(mail_hash, template_id).await? == GateDecision::Blocked {
            debug!("sender already sent this template");
            return Err(Fault::Duplicate);
        }
        Ok(())
    }

    /// Append the send to the log.
    ///
    /// # Errors
    /// Returns an error if the log row cannot be written.
    pub async fn record(
        &self,
        mail_hash: &MailHash,
        template_id: Uuid,
        entity_id: Option<Uuid>,
    ) -> Result<SentLog, StoreError> {
        self.store
            .append_sent_log(&NewSentLog {
                mail_hash: mail_hash.clone(),
                template_id,
                entity_id,
                created_at: Utc::now(),
            })
            .await
    }
}
