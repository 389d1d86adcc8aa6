//! End-to-end letter flow through the HTTP router, backed by the in-memory
//! store and a mailer that only records what it was asked to send.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use glas::{
    api,
    mail::{MailError, MailMessage, Mailer},
    privacy::MailHasher,
    service::{CivicMail, ServiceConfig},
    store::{Entity, EntityKind, MemoryStore, Template},
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<MailMessage>>,
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

impl Outbox {
    async fn last(&self) -> Option<MailMessage> {
        self.sent.lock().await.last().cloned()
    }

    /// The six digits of the most recent code mail.
    async fn last_code(&self) -> Option<u32> {
        let body = self.last().await?.html_body;
        let digits: String = body.chars().filter(char::is_ascii_digit).collect();
        digits.parse().ok()
    }
}

struct Fixture {
    app: Router,
    outbox: Arc<Outbox>,
    store: Arc<MemoryStore>,
    template_id: Uuid,
    entity_id: Uuid,
}

async fn fixture() -> Result<Fixture> {
    let store = Arc::new(MemoryStore::new());
    let entity = Entity {
        id: Uuid::now_v7(),
        name: "Комисия по бюджет и финанси".to_string(),
        email: "budget@parliament.bg".to_string(),
        kind: EntityKind::Committee,
        source_ref: "3001".to_string(),
    };
    let template = Template {
        id: Uuid::now_v7(),
        name: "Прозрачен бюджет".to_string(),
        content: "Уважаеми {entity}, аз, {name} {surname}, настоявам за прозрачност.".to_string(),
        target_entity_ids: vec![entity.id],
    };
    let (template_id, entity_id) = (template.id, entity.id);
    store.insert_entity(entity).await;
    store.insert_template(template).await;

    let outbox = Arc::new(Outbox::default());
    let service = Arc::new(CivicMail::new(
        store.clone(),
        MailHasher::new(&SecretString::from("test-salt"))?,
        outbox.clone(),
        ServiceConfig::new("glas.bg"),
    ));
    let app = api::app(service, api::cors_layer(None)?);

    Ok(Fixture {
        app,
        outbox,
        store,
        template_id,
        entity_id,
    })
}

async fn call(app: &Router, request: Request<Body>) -> Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Ok((status, body))
}

fn post(uri: &str, body: &Value) -> Result<Request<Body>> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .context("failed to build request")
}

fn get(uri: &str) -> Result<Request<Body>> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .context("failed to build request")
}

fn otp_request(fx: &Fixture, mail: &str) -> Value {
    json!({
        "name": "Иван",
        "surname": "Петров",
        "mail": mail,
        "template_id": fx.template_id,
        "entity_id": fx.entity_id,
    })
}

fn verify_request(fx: &Fixture, mail: &str, code: u32) -> Value {
    let mut body = otp_request(fx, mail);
    body["otp_code"] = json!(code);
    body
}

#[tokio::test]
async fn letter_is_sent_once_per_code() -> Result<()> {
    let fx = fixture().await?;
    let mail = "Ivan.Petrov@Example.com";

    let (status, body) = call(&fx.app, post("/request-otp", &otp_request(&fx, mail))?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OTP sent");

    let code_mail = fx.outbox.last().await.context("no code mail")?;
    assert_eq!(code_mail.to, vec!["ivan.petrov@example.com".to_string()]);
    assert_eq!(code_mail.sender, "no-reply@glas.bg");
    let code = fx.outbox.last_code().await.context("no code in mail")?;
    assert!((100_000..=999_999).contains(&code));

    let (status, body) = call(
        &fx.app,
        post("/verify-and-send", &verify_request(&fx, mail, code))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Mail sent successfully");

    let letter = fx.outbox.last().await.context("no letter")?;
    assert_eq!(letter.to, vec!["budget@parliament.bg".to_string()]);
    assert_eq!(letter.subject, "Прозрачен бюджет");
    assert_eq!(
        letter.html_body,
        "Уважаеми Комисия по бюджет и финанси, аз, Иван Петров, настоявам за прозрачност."
    );
    assert_eq!(fx.store.sent_logs().await.len(), 1);

    // a second letter inside the window is rate limited before the code is looked at
    let (status, body) = call(
        &fx.app,
        post("/verify-and-send", &verify_request(&fx, mail, code))?,
    )
    .await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"], "Rate limit exceeded. Try again later.");
    assert_eq!(fx.store.sent_logs().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn wrong_code_is_rejected_and_sends_nothing() -> Result<()> {
    let fx = fixture().await?;
    let mail = "maria@example.com";

    let (status, _) = call(&fx.app, post("/request-otp", &otp_request(&fx, mail))?).await?;
    assert_eq!(status, StatusCode::OK);
    let code = fx.outbox.last_code().await.context("no code in mail")?;
    let wrong = if code == 999_999 { 100_000 } else { code + 1 };

    let (status, body) = call(
        &fx.app,
        post("/verify-and-send", &verify_request(&fx, mail, wrong))?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired OTP");
    assert_eq!(fx.outbox.sent.lock().await.len(), 1);
    assert!(fx.store.sent_logs().await.is_empty());

    // the pending code survives a mismatch
    let (status, _) = call(
        &fx.app,
        post("/verify-and-send", &verify_request(&fx, mail, code))?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn verify_without_request_fails() -> Result<()> {
    let fx = fixture().await?;

    let (status, body) = call(
        &fx.app,
        post(
            "/verify-and-send",
            &verify_request(&fx, "nobody@example.com", 123_456),
        )?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or expired OTP");
    assert!(fx.outbox.sent.lock().await.is_empty());

    Ok(())
}

#[tokio::test]
async fn invalid_input_is_rejected() -> Result<()> {
    let fx = fixture().await?;

    let (status, body) = call(
        &fx.app,
        post("/request-otp", &otp_request(&fx, "not-an-address"))?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let missing = Request::builder()
        .method(Method::POST)
        .uri("/request-otp")
        .body(Body::empty())?;
    let (status, body) = call(&fx.app, missing).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let mut unknown = otp_request(&fx, "ivan@example.com");
    unknown["template_id"] = json!(Uuid::now_v7());
    let (status, _) = call(&fx.app, post("/request-otp", &unknown)?).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(fx.outbox.sent.lock().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn templates_list_their_targets() -> Result<()> {
    let fx = fixture().await?;

    let (status, body) = call(&fx.app, get("/templates")?).await?;
    assert_eq!(status, StatusCode::OK);
    let templates = body.as_array().context("templates is not a list")?;
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0]["name"], "Прозрачен бюджет");
    assert_eq!(templates[0]["targets"][0]["email"], "budget@parliament.bg");

    let uri = format!("/templates/{}/preview?name=Ivan&surname=Petrov", fx.template_id);
    let (status, body) = call(&fx.app, get(&uri)?).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["content"]
        .as_str()
        .is_some_and(|content| content.contains("Ivan Petrov")));

    Ok(())
}

#[tokio::test]
async fn entities_filter_by_type() -> Result<()> {
    let fx = fixture().await?;

    let (status, body) = call(&fx.app, get("/entities?type=committee")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, body) = call(&fx.app, get("/entities?type=mp")?).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(0));

    Ok(())
}

#[tokio::test]
async fn health_and_request_id() -> Result<()> {
    let fx = fixture().await?;

    let response = fx.app.clone().oneshot(get("/health")?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-app"));

    Ok(())
}
