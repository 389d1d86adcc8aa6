//! `request-otp` and `verify-and-send`.
//!
//! Request bodies carry the raw address; it is validated and hashed by the
//! service and never logged here.

use crate::{
    api::handlers::{ErrorBody, MessageBody},
    error::Fault,
    service::{CivicMail, LetterRequest},
};
use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize)]
pub struct OtpRequest {
    pub name: String,
    pub surname: String,
    pub mail: String,
    pub template_id: Uuid,
    pub entity_id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub mail: String,
    pub otp_code: u32,
    pub name: String,
    pub surname: String,
    pub template_id: Uuid,
    pub entity_id: Uuid,
}

impl From<OtpRequest> for LetterRequest {
    fn from(request: OtpRequest) -> Self {
        Self {
            name: request.name,
            surname: request.surname,
            mail: request.mail,
            template_id: request.template_id,
            entity_id: request.entity_id,
        }
    }
}

fn missing_payload() -> Fault {
    Fault::Validation("Missing or malformed payload".to_string())
}

#[utoipa::path(
    post,
    path= "/request-otp",
    request_body = OtpRequest,
    responses (
        (status = 200, description = "Code mailed to the citizen", body = MessageBody),
        (status = 400, description = "Invalid input or template already sent", body = ErrorBody),
        (status = 404, description = "Unknown template or entity", body = ErrorBody),
        (status = 429, description = "Sender is rate limited", body = ErrorBody),
        (status = 502, description = "Mail could not be sent", body = ErrorBody)
    ),
    tag= "letters"
)]
#[instrument(skip_all)]
pub async fn request_otp(
    service: Extension<Arc<CivicMail>>,
    payload: Option<Json<OtpRequest>>,
) -> Result<Json<MessageBody>, Fault> {
    let Some(Json(request)) = payload else {
        return Err(missing_payload());
    };

    service.request_otp(&request.into()).await?;

    Ok(Json(MessageBody::new("OTP sent")))
}

#[utoipa::path(
    post,
    path= "/verify-and-send",
    request_body = VerifyRequest,
    responses (
        (status = 200, description = "Letter sent", body = MessageBody),
        (status = 400, description = "Invalid input, invalid or expired OTP, or template already sent", body = ErrorBody),
        (status = 404, description = "Unknown template or entity", body = ErrorBody),
        (status = 429, description = "Sender is rate limited", body = ErrorBody),
        (status = 502, description = "Mail could not be sent", body = ErrorBody)
    ),
    tag= "letters"
)]
#[instrument(skip_all)]
pub async fn verify_and_send(
    service: Extension<Arc<CivicMail>>,
    payload: Option<Json<VerifyRequest>>,
) -> Result<Json<MessageBody>, Fault> {
    let Some(Json(request)) = payload else {
        return Err(missing_payload());
    };

    let letter = LetterRequest {
        name: request.name,
        surname: request.surname,
        mail: request.mail,
        template_id: request.template_id,
        entity_id: request.entity_id,
    };
    service.verify_and_send(&letter, request.otp_code).await?;

    Ok(Json(MessageBody::new("Mail sent successfully")))
}
