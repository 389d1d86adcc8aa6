//! In-process record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AuthAttempt, AuthState, Entity, EntityKind, NewAuthAttempt, NewEntity, NewSentLog,
    RecordStore, SentLog, StoreError, Template,
};
use crate::privacy::MailHash;

#[derive(Default)]
struct Collections {
    entities: Vec<Entity>,
    templates: Vec<Template>,
    auth_attempts: Vec<AuthAttempt>,
    sent_logs: Vec<SentLog>,
}

/// Record store kept in memory. Attempts and logs are kept in insertion order,
/// which doubles as the tie breaker for equal creation timestamps.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
    entity_writes: AtomicU64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a template; templates are authored outside this service.
    pub async fn insert_template(&self, template: Template) {
        self.collections.write().await.templates.push(template);
    }

    /// Seed an entity without counting it as a sync write.
    pub async fn insert_entity(&self, entity: Entity) {
        self.collections.write().await.entities.push(entity);
    }

    /// Number of entity create/update/delete calls served so far.
    #[must_use]
    pub fn entity_writes(&self) -> u64 {
        self.entity_writes.load(Ordering::Relaxed)
    }

    pub async fn auth_attempts(&self, mail_hash: &MailHash) -> Vec<AuthAttempt> {
        self.collections
            .read()
            .await
            .auth_attempts
            .iter()
            .filter(|attempt| &attempt.mail_hash == mail_hash)
            .cloned()
            .collect()
    }

    pub async fn sent_logs(&self) -> Vec<SentLog> {
        self.collections.read().await.sent_logs.clone()
    }

    fn count_entity_write(&self) {
        self.entity_writes.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn list_entities(&self, kind: Option<EntityKind>) -> Result<Vec<Entity>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .entities
            .iter()
            .filter(|entity| kind.map_or(true, |kind| entity.kind == kind))
            .cloned()
            .collect())
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.entities.iter().find(|e| e.id == id).cloned())
    }

    async fn entities_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Entity>, StoreError> {
        let collections = self.collections.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| collections.entities.iter().find(|e| e.id == *id))
            .cloned()
            .collect())
    }

    async fn create_entity(&self, entity: &NewEntity) -> Result<Entity, StoreError> {
        self.count_entity_write();
        let created = Entity {
            id: Uuid::now_v7(),
            name: entity.name.clone(),
            email: entity.email.clone(),
            kind: entity.kind,
            source_ref: entity.source_ref.clone(),
        };
        self.collections
            .write()
            .await
            .entities
            .push(created.clone());
        Ok(created)
    }

    async fn update_entity(&self, id: Uuid, entity: &NewEntity) -> Result<(), StoreError> {
        self.count_entity_write();
        let mut collections = self.collections.write().await;
        let stored = collections
            .entities
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(StoreError::Missing(id))?;
        stored.name.clone_from(&entity.name);
        stored.email.clone_from(&entity.email);
        stored.kind = entity.kind;
        stored.source_ref.clone_from(&entity.source_ref);
        Ok(())
    }

    async fn delete_entity(&self, id: Uuid) -> Result<(), StoreError> {
        self.count_entity_write();
        let mut collections = self.collections.write().await;
        let before = collections.entities.len();
        collections.entities.retain(|e| e.id != id);
        if collections.entities.len() == before {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        Ok(self.collections.read().await.templates.clone())
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<Template>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.templates.iter().find(|t| t.id == id).cloned())
    }

    async fn create_auth_attempt(
        &self,
        attempt: &NewAuthAttempt,
    ) -> Result<AuthAttempt, StoreError> {
        let created = AuthAttempt {
            id: Uuid::now_v7(),
            mail_hash: attempt.mail_hash.clone(),
            code: attempt.code,
            expires_at: attempt.expires_at,
            state: AuthState::Sent,
            created_at: attempt.created_at,
        };
        self.collections
            .write()
            .await
            .auth_attempts
            .push(created.clone());
        Ok(created)
    }

    async fn live_auth_attempt(
        &self,
        mail_hash: &MailHash,
    ) -> Result<Option<AuthAttempt>, StoreError> {
        let collections = self.collections.read().await;
        // max_by_key keeps the last maximum, so later inserts win ties.
        Ok(collections
            .auth_attempts
            .iter()
            .filter(|a| &a.mail_hash == mail_hash)
            .max_by_key(|a| a.created_at)
            .filter(|a| a.state == AuthState::Sent)
            .cloned())
    }

    async fn transition_auth_attempt(
        &self,
        id: Uuid,
        from: AuthState,
        to: AuthState,
    ) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().await;
        let attempt = collections
            .auth_attempts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(StoreError::Missing(id))?;
        if attempt.state != from {
            return Ok(false);
        }
        attempt.state = to;
        Ok(true)
    }

    async fn sent_log_exists_since(
        &self,
        mail_hash: &MailHash,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .sent_logs
            .iter()
            .any(|log| &log.mail_hash == mail_hash && log.created_at > since))
    }

    async fn sent_log_exists_for_template(
        &self,
        mail_hash: &MailHash,
        template_id: Uuid,
    ) -> Result<bool, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .sent_logs
            .iter()
            .any(|log| &log.mail_hash == mail_hash && log.template_id == template_id))
    }

    async fn append_sent_log(&self, log: &NewSentLog) -> Result<SentLog, StoreError> {
        let created = SentLog {
            id: Uuid::now_v7(),
            mail_hash: log.mail_hash.clone(),
            template_id: log.template_id,
            entity_id: log.entity_id,
            created_at: log.created_at,
        };
        self.collections
            .write()
            .await
            .sent_logs
            .push(created.clone());
        Ok(created)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
