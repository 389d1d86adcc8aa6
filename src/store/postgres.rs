//! Postgres-backed record store. Schema lives in `db/sql/01_glas.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Connection, PgPool, Row};
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{
    AuthAttempt, AuthState, Entity, EntityKind, NewAuthAttempt, NewEntity, NewSentLog,
    RecordStore, SentLog, StoreError, Template,
};
use crate::privacy::MailHash;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_span(operation: &'static str, statement: &'static str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn entity_from_row(row: &PgRow) -> Result<Entity, StoreError> {
    let kind: String = row.try_get("kind")?;
    Ok(Entity {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        kind: EntityKind::parse(&kind)
            .ok_or_else(|| StoreError::Shape(format!("unknown entity kind: {kind}")))?,
        source_ref: row.try_get("source_ref")?,
    })
}

fn template_from_row(row: &PgRow) -> Result<Template, StoreError> {
    Ok(Template {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        content: row.try_get("content")?,
        target_entity_ids: row.try_get("target_entity_ids")?,
    })
}

fn auth_attempt_from_row(row: &PgRow) -> Result<AuthAttempt, StoreError> {
    let code: i32 = row.try_get("code")?;
    let state: String = row.try_get("state")?;
    Ok(AuthAttempt {
        id: row.try_get("id")?,
        mail_hash: MailHash::from_stored(row.try_get("mail_hash")?),
        code: u32::try_from(code)
            .map_err(|_| StoreError::Shape(format!("negative otp code: {code}")))?,
        expires_at: row.try_get("expires_at")?,
        state: AuthState::parse(&state)
            .ok_or_else(|| StoreError::Shape(format!("unknown auth state: {state}")))?,
        created_at: row.try_get("created_at")?,
    })
}

fn sent_log_from_row(row: &PgRow) -> Result<SentLog, StoreError> {
    Ok(SentLog {
        id: row.try_get("id")?,
        mail_hash: MailHash::from_stored(row.try_get("mail_hash")?),
        template_id: row.try_get("template_id")?,
        entity_id: row.try_get("entity_id")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl RecordStore for PgStore {
    async fn list_entities(&self, kind: Option<EntityKind>) -> Result<Vec<Entity>, StoreError> {
        let query = r"
            SELECT id, name, email, kind, source_ref
            FROM entities
            WHERE ($1::text IS NULL OR kind = $1)
            ORDER BY name
        ";
        let rows = sqlx::query(query)
            .bind(kind.map(EntityKind::as_str))
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>, StoreError> {
        let query = "SELECT id, name, email, kind, source_ref FROM entities WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(entity_from_row).transpose()
    }

    async fn entities_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Entity>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = r"
            SELECT e.id, e.name, e.email, e.kind, e.source_ref
            FROM UNNEST($1::uuid[]) WITH ORDINALITY AS wanted(id, position)
            JOIN entities e ON e.id = wanted.id
            ORDER BY wanted.position
        ";
        let rows = sqlx::query(query)
            .bind(ids)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        rows.iter().map(entity_from_row).collect()
    }

    async fn create_entity(&self, entity: &NewEntity) -> Result<Entity, StoreError> {
        let query = r"
            INSERT INTO entities (id, name, email, kind, source_ref)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, kind, source_ref
        ";
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(&entity.name)
            .bind(&entity.email)
            .bind(entity.kind.as_str())
            .bind(&entity.source_ref)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        entity_from_row(&row)
    }

    async fn update_entity(&self, id: Uuid, entity: &NewEntity) -> Result<(), StoreError> {
        let query = r"
            UPDATE entities
            SET name = $2, email = $3, kind = $4, source_ref = $5, updated_at = NOW()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(&entity.name)
            .bind(&entity.email)
            .bind(entity.kind.as_str())
            .bind(&entity.source_ref)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }

    async fn delete_entity(&self, id: Uuid) -> Result<(), StoreError> {
        let query = "DELETE FROM entities WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }

    async fn list_templates(&self) -> Result<Vec<Template>, StoreError> {
        let query = "SELECT id, name, content, target_entity_ids FROM templates";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        rows.iter().map(template_from_row).collect()
    }

    async fn get_template(&self, id: Uuid) -> Result<Option<Template>, StoreError> {
        let query = "SELECT id, name, content, target_entity_ids FROM templates WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(template_from_row).transpose()
    }

    async fn create_auth_attempt(
        &self,
        attempt: &NewAuthAttempt,
    ) -> Result<AuthAttempt, StoreError> {
        let code = i32::try_from(attempt.code)
            .map_err(|_| StoreError::Shape(format!("otp code out of range: {}", attempt.code)))?;
        let query = r"
            INSERT INTO auth_attempts (id, mail_hash, code, expires_at, state, created_at)
            VALUES ($1, $2, $3, $4, 'sent', $5)
            RETURNING id, mail_hash, code, expires_at, state, created_at
        ";
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(attempt.mail_hash.as_str())
            .bind(code)
            .bind(attempt.expires_at)
            .bind(attempt.created_at)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        auth_attempt_from_row(&row)
    }

    async fn live_auth_attempt(
        &self,
        mail_hash: &MailHash,
    ) -> Result<Option<AuthAttempt>, StoreError> {
        let query = r"
            SELECT id, mail_hash, code, expires_at, state, created_at
            FROM (
                SELECT id, mail_hash, code, expires_at, state, created_at
                FROM auth_attempts
                WHERE mail_hash = $1
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            ) newest
            WHERE state = 'sent'
        ";
        let row = sqlx::query(query)
            .bind(mail_hash.as_str())
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        row.as_ref().map(auth_attempt_from_row).transpose()
    }

    async fn transition_auth_attempt(
        &self,
        id: Uuid,
        from: AuthState,
        to: AuthState,
    ) -> Result<bool, StoreError> {
        // The state predicate makes this a compare-and-swap.
        let query = "UPDATE auth_attempts SET state = $3 WHERE id = $1 AND state = $2";
        let result = sqlx::query(query)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn sent_log_exists_since(
        &self,
        mail_hash: &MailHash,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = r"
            SELECT EXISTS (
                SELECT 1 FROM sent_logs WHERE mail_hash = $1 AND created_at > $2
            ) AS found
        ";
        let row = sqlx::query(query)
            .bind(mail_hash.as_str())
            .bind(since)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(row.try_get("found")?)
    }

    async fn sent_log_exists_for_template(
        &self,
        mail_hash: &MailHash,
        template_id: Uuid,
    ) -> Result<bool, StoreError> {
        let query = r"
            SELECT EXISTS (
                SELECT 1 FROM sent_logs WHERE mail_hash = $1 AND template_id = $2
            ) AS found
        ";
        let row = sqlx::query(query)
            .bind(mail_hash.as_str())
            .bind(template_id)
            .fetch_one(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(row.try_get("found")?)
    }

    async fn append_sent_log(&self, log: &NewSentLog) -> Result<SentLog, StoreError> {
        let query = r"
            INSERT INTO sent_logs (id, mail_hash, template_id, entity_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, mail_hash, template_id, entity_id, created_at
        ";
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(log.mail_hash.as_str())
            .bind(log.template_id)
            .bind(log.entity_id)
            .bind(log.created_at)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        sent_log_from_row(&row)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}
