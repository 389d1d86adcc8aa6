//! Request orchestration for the two citizen-facing operations.
//!
//! [`CivicMail`] is built once at startup and shared with every handler. It
//! owns no mutable state; everything shared lives in the record store.
//!
//! `request_otp`:   validate → hash → template/target → gate → issue → mail code
//! `verify_and_send`: validate → hash → template/target → gate → verify → render
//! → mail letter → record

use chrono::Duration;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::address::{normalize_email, reply_to_address, valid_email};
use crate::error::Fault;
use crate::gate::SendGate;
use crate::mail::{MailMessage, Mailer};
use crate::otp::Authenticator;
use crate::privacy::{MailHash, MailHasher};
use crate::store::{Entity, RecordStore, SentLog, Template};
use crate::templates::{letter_substitutions, render, TemplateEngine};

pub const OTP_SUBJECT: &str = "Вашият код за потвърждение";
pub const FALLBACK_LETTER_SUBJECT: &str = "Гражданско писмо";

/// Citizen details shared by both operations.
#[derive(Clone, Debug)]
pub struct LetterRequest {
    pub name: String,
    pub surname: String,
    pub mail: String,
    pub template_id: Uuid,
    pub entity_id: Uuid,
}

/// A request that passed validation, with the address normalized.
struct Checked<'a> {
    request: &'a LetterRequest,
    email: String,
    mail_hash: MailHash,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    sender_domain: String,
    sender_local_part: String,
    otp_ttl: Duration,
    rate_limit_window: Duration,
}

impl ServiceConfig {
    /// Defaults: `no-reply` sender, 10 minute codes, 168 hour window.
    #[must_use]
    pub fn new(sender_domain: &str) -> Self {
        Self {
            sender_domain: sender_domain.to_string(),
            sender_local_part: "no-reply".to_string(),
            otp_ttl: Duration::minutes(10),
            rate_limit_window: Duration::hours(crate::gate::DEFAULT_RATE_LIMIT_HOURS),
        }
    }

    #[must_use]
    pub fn with_sender_local_part(mut self, local_part: &str) -> Self {
        self.sender_local_part = local_part.to_string();
        self
    }

    #[must_use]
    pub fn with_otp_ttl_minutes(mut self, minutes: u32) -> Self {
        self.otp_ttl = Duration::minutes(i64::from(minutes));
        self
    }

    #[must_use]
    pub fn with_rate_limit_hours(mut self, hours: u32) -> Self {
        self.rate_limit_window = Duration::hours(i64::from(hours));
        self
    }

    #[must_use]
    pub fn sender_domain(&self) -> &str {
        &self.sender_domain
    }

    #[must_use]
    pub fn sender_address(&self) -> String {
        format!("{}@{}", self.sender_local_part, self.sender_domain)
    }
}

pub struct CivicMail {
    store: Arc<dyn RecordStore>,
    hasher: MailHasher,
    authenticator: Authenticator,
    gate: SendGate,
    templates: TemplateEngine,
    mailer: Arc<dyn Mailer>,
    config: ServiceConfig,
}

impl CivicMail {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        hasher: MailHasher,
        mailer: Arc<dyn Mailer>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            authenticator: Authenticator::new(store.clone(), config.otp_ttl),
            gate: SendGate::new(store.clone(), config.rate_limit_window),
            templates: TemplateEngine::new(store.clone()),
            store,
            hasher,
            mailer,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    #[must_use]
    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Validate the request, issue a code and mail it to the citizen.
    ///
    /// # Errors
    /// `Validation`, `NotFound`, `RateLimited` and `Duplicate` short-circuit
    /// before any code is issued. `Store` and `Transport` fail the request.
    #[instrument(skip_all, fields(template_id = %request.template_id, entity_id = %request.entity_id))]
    pub async fn request_otp(&self, request: &LetterRequest) -> Result<(), Fault> {
        let checked = self.check(request)?;
        let (template, _) = self.target(&checked).await?;
        self.gate.admit(&checked.mail_hash, template.id).await?;

        let (attempt, code) = self.authenticator.issue(&checked.mail_hash).await?;
        self.mailer
            .send(&MailMessage {
                to: vec![checked.email],
                sender: self.config.sender_address(),
                subject: OTP_SUBJECT.to_string(),
                html_body: format!("Вашият код за потвърждение е: {code}"),
                reply_to: None,
            })
            .await?;

        info!(mail_hash = %checked.mail_hash, attempt_id = %attempt.id, "otp mailed");
        Ok(())
    }

    /// Verify the code and send the rendered letter to the target entity.
    ///
    /// # Errors
    /// Gate faults are checked before the code is consumed. Any failed
    /// verification is `Auth`. `Transport` leaves the send unrecorded.
    #[instrument(skip_all, fields(template_id = %request.template_id, entity_id = %request.entity_id))]
    pub async fn verify_and_send(
        &self,
        request: &LetterRequest,
        otp_code: u32,
    ) -> Result<SentLog, Fault> {
        let checked = self.check(request)?;
        let (template, entity) = self.target(&checked).await?;
        self.gate.admit(&checked.mail_hash, template.id).await?;

        let verification = self
            .authenticator
            .verify(&checked.mail_hash, otp_code)
            .await?;
        if !verification.is_verified() {
            info!(mail_hash = %checked.mail_hash, ?verification, "otp rejected");
            return Err(Fault::Auth);
        }

        let body = render(
            &template.content,
            &letter_substitutions(&request.name, &request.surname, Some(&entity.name)),
        );
        let subject = if template.name.trim().is_empty() {
            FALLBACK_LETTER_SUBJECT.to_string()
        } else {
            template.name.clone()
        };
        self.mailer
            .send(&MailMessage {
                to: vec![entity.email.clone()],
                sender: self.config.sender_address(),
                subject,
                html_body: body,
                reply_to: reply_to_address(
                    &request.name,
                    &request.surname,
                    self.config.sender_domain(),
                ),
            })
            .await?;

        let log = self
            .gate
            .record(&checked.mail_hash, template.id, Some(entity.id))
            .await
            .map_err(|err| {
                error!(mail_hash = %checked.mail_hash, "letter sent but not logged: {err}");
                Fault::Store(err)
            })?;
        info!(mail_hash = %checked.mail_hash, sent_log_id = %log.id, "letter sent");
        Ok(log)
    }

    /// Render a template with the citizen's names only.
    ///
    /// # Errors
    /// `NotFound` for an unknown template.
    pub async fn preview(&self, template_id: Uuid, name: &str, surname: &str) -> Result<String, Fault> {
        let template = self.templates.get_template(template_id).await?;
        Ok(render(
            &template.content,
            &letter_substitutions(name, surname, None),
        ))
    }

    fn check<'a>(&self, request: &'a LetterRequest) -> Result<Checked<'a>, Fault> {
        if request.name.trim().is_empty() {
            return Err(Fault::Validation("Missing name".to_string()));
        }
        if request.surname.trim().is_empty() {
            return Err(Fault::Validation("Missing surname".to_string()));
        }
        let email = normalize_email(&request.mail);
        if !valid_email(&email) {
            return Err(Fault::Validation("Invalid email".to_string()));
        }
        let mail_hash = self.hasher.hash(&email);
        Ok(Checked {
            request,
            email,
            mail_hash,
        })
    }

    /// Load the template and entity, enforcing the template's target list.
    async fn target(&self, checked: &Checked<'_>) -> Result<(Template, Entity), Fault> {
        let template = self
            .templates
            .get_template(checked.request.template_id)
            .await?;
        let entity_id = checked.request.entity_id;
        let entity = self
            .store
            .get_entity(entity_id)
            .await?
            .ok_or(Fault::NotFound {
                kind: "entity",
                id: entity_id,
            })?;
        if !template.target_entity_ids.is_empty() && !template.target_entity_ids.contains(&entity.id)
        {
            return Err(Fault::Validation(
                "Entity is not a target of this template".to_string(),
            ));
        }
        Ok((template, entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AuthState, EntityKind, MemoryStore, NewSentLog};
    use crate::testing::{RecordingMailer, UnreachableStore};
    use anyhow::Result;
    use secrecy::SecretString;

    struct Fixture {
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        service: CivicMail,
        template: Template,
        entity: Entity,
    }

    fn hasher() -> Result<MailHasher> {
        MailHasher::new(&SecretString::from("pepper".to_string()))
    }

    async fn fixture_with(mailer: RecordingMailer) -> Result<Fixture> {
        let store = Arc::new(MemoryStore::new());
        let entity = Entity {
            id: Uuid::now_v7(),
            name: "Комисия по бюджет".to_string(),
            email: "budget@parliament.bg".to_string(),
            kind: EntityKind::Committee,
            source_ref: "committee/1".to_string(),
        };
        let template = Template {
            id: Uuid::now_v7(),
            name: "Бюджет 2026".to_string(),
            content: "Уважаеми {entity}, пише ви {name} {surname}.".to_string(),
            target_entity_ids: vec![entity.id],
        };
        store.insert_entity(entity.clone()).await;
        store.insert_template(template.clone()).await;

        let mailer = Arc::new(mailer);
        let service = CivicMail::new(
            store.clone(),
            hasher()?,
            mailer.clone(),
            ServiceConfig::new("glas.bg"),
        );
        Ok(Fixture {
            store,
            mailer,
            service,
            template,
            entity,
        })
    }

    async fn fixture() -> Result<Fixture> {
        fixture_with(RecordingMailer::default()).await
    }

    fn request(fixture: &Fixture) -> LetterRequest {
        LetterRequest {
            name: "Ana".to_string(),
            surname: "Petrova".to_string(),
            mail: " Ana@Example.com ".to_string(),
            template_id: fixture.template.id,
            entity_id: fixture.entity.id,
        }
    }

    fn code_from(message: &MailMessage) -> Option<u32> {
        message
            .html_body
            .rsplit(' ')
            .next()
            .and_then(|code| code.parse().ok())
    }

    #[tokio::test]
    async fn full_flow_sends_letter_and_logs_once() -> Result<()> {
        let fx = fixture().await?;
        let request = request(&fx);

        fx.service.request_otp(&request).await?;
        let sent = fx.mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, vec!["ana@example.com".to_string()]);
        assert_eq!(sent[0].subject, OTP_SUBJECT);
        assert_eq!(sent[0].sender, "no-reply@glas.bg");
        let code = code_from(&sent[0]).ok_or_else(|| anyhow::anyhow!("no code in mail"))?;

        let log = fx.service.verify_and_send(&request, code).await?;
        assert_eq!(log.template_id, fx.template.id);
        assert_eq!(log.entity_id, Some(fx.entity.id));

        let sent = fx.mailer.sent().await;
        let letter = &sent[1];
        assert_eq!(letter.to, vec!["budget@parliament.bg".to_string()]);
        assert_eq!(letter.subject, "Бюджет 2026");
        assert_eq!(
            letter.html_body,
            "Уважаеми Комисия по бюджет, пише ви Ana Petrova."
        );
        assert_eq!(letter.reply_to.as_deref(), Some("ana.petrova@glas.bg"));
        assert_eq!(fx.store.sent_logs().await.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn letter_body_escapes_citizen_markup() -> Result<()> {
        let fx = fixture().await?;
        let mut request = request(&fx);
        request.name = "<a href=x>Ana</a>".to_string();

        fx.service.request_otp(&request).await?;
        let sent = fx.mailer.sent().await;
        let code = code_from(&sent[0]).ok_or_else(|| anyhow::anyhow!("no code in mail"))?;
        fx.service.verify_and_send(&request, code).await?;

        let sent = fx.mailer.sent().await;
        assert_eq!(
            sent[1].html_body,
            "Уважаеми Комисия по бюджет, пише ви &lt;a href=x&gt;Ana&lt;&#x2F;a&gt; Petrova."
        );
        assert!(!sent[1].html_body.contains('<'));
        Ok(())
    }

    #[tokio::test]
    async fn sent_logs_never_hold_raw_address() -> Result<()> {
        let fx = fixture().await?;
        let request = request(&fx);
        fx.service.request_otp(&request).await?;
        let code = code_from(&fx.mailer.sent().await[0]).unwrap_or_default();
        fx.service.verify_and_send(&request, code).await?;

        let log = &fx.store.sent_logs().await[0];
        assert!(!log.mail_hash.as_str().contains('@'));
        assert_eq!(log.mail_hash, hasher()?.hash("ana@example.com"));
        Ok(())
    }

    #[tokio::test]
    async fn rate_limited_sender_gets_no_code() -> Result<()> {
        let fx = fixture().await?;
        fx.store
            .append_sent_log(&NewSentLog {
                mail_hash: hasher()?.hash("ana@example.com"),
                template_id: Uuid::now_v7(),
                entity_id: None,
                created_at: chrono::Utc::now() - Duration::hours(1),
            })
            .await?;

        let result = fx.service.request_otp(&request(&fx)).await;
        assert!(matches!(result, Err(Fault::RateLimited)));
        assert!(fx.mailer.sent().await.is_empty());
        assert!(fx
            .store
            .auth_attempts(&hasher()?.hash("ana@example.com"))
            .await
            .is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_template_is_rejected() -> Result<()> {
        let fx = fixture().await?;
        fx.store
            .append_sent_log(&NewSentLog {
                mail_hash: hasher()?.hash("ana@example.com"),
                template_id: fx.template.id,
                entity_id: None,
                created_at: chrono::Utc::now() - Duration::hours(500),
            })
            .await?;

        let result = fx.service.request_otp(&request(&fx)).await;
        assert!(matches!(result, Err(Fault::Duplicate)));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_is_auth_fault_and_sends_nothing() -> Result<()> {
        let fx = fixture().await?;
        let request = request(&fx);
        fx.service.request_otp(&request).await?;
        let code = code_from(&fx.mailer.sent().await[0]).unwrap_or_default();
        let wrong = if code == 999_999 { 100_000 } else { code + 1 };

        let result = fx.service.verify_and_send(&request, wrong).await;
        assert!(matches!(result, Err(Fault::Auth)));
        assert_eq!(fx.mailer.sent().await.len(), 1);
        assert!(fx.store.sent_logs().await.is_empty());

        fx.service.verify_and_send(&request, code).await?;
        Ok(())
    }

    #[tokio::test]
    async fn code_cannot_be_reused() -> Result<()> {
        let fx = fixture().await?;
        let request = request(&fx);
        fx.service.request_otp(&request).await?;
        let code = code_from(&fx.mailer.sent().await[0]).unwrap_or_default();

        fx.service.verify_and_send(&request, code).await?;
        let again = fx.service.verify_and_send(&request, code).await;
        // The first send now rate limits the sender before the code is looked at.
        assert!(matches!(again, Err(Fault::RateLimited)));
        Ok(())
    }

    #[tokio::test]
    async fn failed_transport_leaves_no_log() -> Result<()> {
        let fx = fixture_with(RecordingMailer::failing()).await?;
        let result = fx.service.request_otp(&request(&fx)).await;
        assert!(matches!(result, Err(Fault::Transport(_))));
        assert!(fx.store.sent_logs().await.is_empty());

        let attempts = fx
            .store
            .auth_attempts(&hasher()?.hash("ana@example.com"))
            .await;
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].state, AuthState::Sent);
        Ok(())
    }

    #[tokio::test]
    async fn entity_outside_targets_is_rejected() -> Result<()> {
        let fx = fixture().await?;
        let outsider = Entity {
            id: Uuid::now_v7(),
            name: "Other".to_string(),
            email: "other@parliament.bg".to_string(),
            kind: EntityKind::Committee,
            source_ref: String::new(),
        };
        fx.store.insert_entity(outsider.clone()).await;

        let mut request = request(&fx);
        request.entity_id = outsider.id;
        assert!(matches!(
            fx.service.request_otp(&request).await,
            Err(Fault::Validation(_))
        ));

        request.entity_id = Uuid::now_v7();
        assert!(matches!(
            fx.service.request_otp(&request).await,
            Err(Fault::NotFound { kind: "entity", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn invalid_input_is_validation_fault() -> Result<()> {
        let fx = fixture().await?;
        let mut bad_mail = request(&fx);
        bad_mail.mail = "not-an-address".to_string();
        assert!(matches!(
            fx.service.request_otp(&bad_mail).await,
            Err(Fault::Validation(_))
        ));

        let mut no_name = request(&fx);
        no_name.name = "  ".to_string();
        assert!(matches!(
            fx.service.request_otp(&no_name).await,
            Err(Fault::Validation(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn preview_fills_names_only() -> Result<()> {
        let fx = fixture().await?;
        let preview = fx.service.preview(fx.template.id, "Ana", "Petrova").await?;
        assert_eq!(preview, "Уважаеми {entity}, пише ви Ana Petrova.");
        Ok(())
    }

    #[tokio::test]
    async fn store_outage_is_store_fault() -> Result<()> {
        let service = CivicMail::new(
            Arc::new(UnreachableStore),
            hasher()?,
            Arc::new(RecordingMailer::default()),
            ServiceConfig::new("glas.bg"),
        );
        let request = LetterRequest {
            name: "Ana".to_string(),
            surname: "Petrova".to_string(),
            mail: "ana@example.com".to_string(),
            template_id: Uuid::now_v7(),
            entity_id: Uuid::now_v7(),
        };
        assert!(matches!(
            service.verify_and_send(&request, 123_456).await,
            Err(Fault::Store(_))
        ));
        Ok(())
    }

    #[test]
    fn sender_address_uses_local_part_and_domain() {
        let config = ServiceConfig::new("glas.bg").with_sender_local_part("pisma");
        assert_eq!(config.sender_address(), "pisma@glas.bg");
    }
}
