//! Test doubles shared by unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::mail::{MailError, MailMessage, Mailer};
use crate::privacy::MailHash;
use crate::store::{
    AuthAttempt, AuthState, Entity, EntityKind, NewAuthAttempt, NewEntity, NewSentLog,
    RecordStore, SentLog, StoreError, Template,
};

/// Store whose every call fails, standing in for a lost database.
pub struct UnreachableStore;

fn down<T>() -> Result<T, StoreError> {
    Err(StoreError::Shape("store unreachable".to_string()))
}

#[async_trait]
impl RecordStore for UnreachableStore {
    async fn list_entities(&self, _: Option<EntityKind>) -> Result<Vec<Entity>, StoreError> {
        down()
    }
    async fn get_entity(&self, _: Uuid) -> Result<Option<Entity>, StoreError> {
        down()
    }
    async fn entities_by_ids(&self, _: &[Uuid]) -> Result<Vec<Entity>, StoreError> {
        down()
    }
    async fn create_entity(&self, _: &NewEntity) -> Result<Entity, StoreError> {
        down()
    }
    async fn update_entity(&self, _: Uuid, _: &NewEntity) -> Result<(), StoreError> {
        down()
    }
    async fn delete_entity(&self, _: Uuid) -> Result<(), StoreError> {
        down()
    }
    async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        down()
    }
    async fn get_template(&self, _: Uuid) -> Result<Option<Template>, StoreError> {
        down()
    }
    async fn create_auth_attempt(&self, _: &NewAuthAttempt) -> Result<AuthAttempt, StoreError> {
        down()
    }
    async fn live_auth_attempt(&self, _: &MailHash) -> Result<Option<AuthAttempt>, StoreError> {
        down()
    }
    async fn transition_auth_attempt(
        &self,
        _: Uuid,
        _: AuthState,
        _: AuthState,
    ) -> Result<bool, StoreError> {
        down()
    }
    async fn sent_log_exists_since(
        &self,
        _: &MailHash,
        _: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        down()
    }
    async fn sent_log_exists_for_template(
        &self,
        _: &MailHash,
        _: Uuid,
    ) -> Result<bool, StoreError> {
        down()
    }
    async fn append_sent_log(&self, _: &NewSentLog) -> Result<SentLog, StoreError> {
        down()
    }
    async fn ping(&self) -> Result<(), StoreError> {
        down()
    }
}

/// Mailer that keeps every message, or rejects all of them when `failing`.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
    failing: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: true,
        }
    }

    pub async fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        if self.failing {
            return Err(MailError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}
