//! HTTP handlers for the letter API.
//!
//! Handlers stay thin: they decode the request, call into
//! [`crate::service::CivicMail`] and let [`crate::error::Fault`] pick the
//! status code.

pub mod entities;
pub mod health;
pub mod letters;
pub mod root;
pub mod templates;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned for every non-2xx answer produced by a handler.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    #[must_use]
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}
