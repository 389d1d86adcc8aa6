//! Fault taxonomy for the interactive request path.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::{mail::MailError, store::StoreError};

/// The message returned for every OTP failure, whatever the cause.
pub const AUTH_FAULT_MESSAGE: &str = "Invalid or expired OTP";

#[derive(Debug, Error)]
pub enum Fault {
    #[error("{0}")]
    Validation(String),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },
    #[error("Rate limit exceeded. Try again later.")]
    RateLimited,
    #[error("You have already sent this template.")]
    Duplicate,
    #[error("Invalid or expired OTP")]
    Auth,
    #[error("mail dispatch failed: {0}")]
    Transport(#[from] MailError),
    #[error("record store failure: {0}")]
    Store(#[from] StoreError),
}

impl Fault {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Duplicate | Self::Auth => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Text safe to hand back to the caller.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Transport(_) => "Mail could not be sent, please try again later".to_string(),
            Self::Store(_) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Fault {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.public_message() }))).into_response()
    }
}
