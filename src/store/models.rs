use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::privacy::MailHash;

/// Category of a mail recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Committee,
    Mp,
    Company,
    GovernmentEntity,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Committee => "committee",
            Self::Mp => "mp",
            Self::Company => "company",
            Self::GovernmentEntity => "government_entity",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "committee" => Some(Self::Committee),
            "mp" => Some(Self::Mp),
            "company" => Some(Self::Company),
            "government_entity" => Some(Self::GovernmentEntity),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A government body, MP or organization that can receive civic mail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Entity {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub source_ref: String,
}

impl Entity {
    /// True when the stored record already carries every field of `draft`.
    #[must_use]
    pub fn matches(&self, draft: &NewEntity) -> bool {
        self.name == draft.name
            && self.email == draft.email
            && self.kind == draft.kind
            && self.source_ref == draft.source_ref
    }
}

/// Entity fields as produced by the directory transform, before an id exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEntity {
    pub name: String,
    pub email: String,
    pub kind: EntityKind,
    pub source_ref: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    /// Ordered target references; empty means any entity may be addressed.
    #[serde(default)]
    pub target_entity_ids: Vec<Uuid>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    Sent,
    Success,
    Failed,
    Expired,
}

impl AuthState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sent" => Some(Self::Sent),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// One issued code. The code itself never leaves the authenticator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthAttempt {
    pub id: Uuid,
    pub mail_hash: MailHash,
    pub code: u32,
    pub expires_at: DateTime<Utc>,
    pub state: AuthState,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewAuthAttempt {
    pub mail_hash: MailHash,
    pub code: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of a dispatched letter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentLog {
    pub id: Uuid,
    pub mail_hash: MailHash,
    pub template_id: Uuid,
    pub entity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewSentLog {
    pub mail_hash: MailHash,
    pub template_id: Uuid,
    pub entity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
