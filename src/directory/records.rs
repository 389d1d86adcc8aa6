//! Wire shapes of the parliament directory and their canonical transform.
//!
//! One listing/profile pair per category. Listings arrive in bulk, profiles
//! are fetched per item and carry the contact address.

use serde::Deserialize;
use thiserror::Error;

use crate::address::{normalize_email, valid_email};
use crate::store::{EntityKind, NewEntity};

#[derive(Clone, Debug, Deserialize)]
pub struct MpRoster {
    #[serde(rename = "colListMP", default)]
    pub items: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MpListing {
    #[serde(rename = "A_ns_MP_id")]
    pub id: i64,
    #[serde(rename = "A_ns_MPL_Name1", default)]
    pub first_name: String,
    #[serde(rename = "A_ns_MPL_Name2", default)]
    pub middle_name: String,
    #[serde(rename = "A_ns_MPL_Name3", default)]
    pub last_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MpProfile {
    #[serde(rename = "A_ns_MP_Email", default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CommitteeListing {
    #[serde(rename = "A_ns_C_id")]
    pub id: i64,
    #[serde(rename = "A_ns_CL_value", default)]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CommitteeProfile {
    #[serde(rename = "A_ns_CDemail", default)]
    pub email: Option<String>,
}

/// A listing joined with its profile, tagged by category.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DirectoryRecord {
    Mp {
        listing: MpListing,
        profile: MpProfile,
        source_ref: String,
    },
    Committee {
        listing: CommitteeListing,
        profile: CommitteeProfile,
        source_ref: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("record {0} has no name")]
    MissingName(i64),
    #[error("record {0} has no email")]
    MissingEmail(i64),
    #[error("record {0} has a malformed email")]
    InvalidEmail(i64),
}

fn canonical_email(id: i64, raw: Option<&str>) -> Result<String, TransformError> {
    let email = raw
        .map(normalize_email)
        .filter(|email| !email.is_empty())
        .ok_or(TransformError::MissingEmail(id))?;
    if !valid_email(&email) {
        return Err(TransformError::InvalidEmail(id));
    }
    Ok(email)
}

impl DirectoryRecord {
    /// Canonical entity for this record.
    ///
    /// # Errors
    /// Returns an error when the name or a valid email is missing.
    pub fn into_entity(self) -> Result<NewEntity, TransformError> {
        match self {
            Self::Mp {
                listing,
                profile,
                source_ref,
            } => {
                let name = [
                    listing.first_name.trim(),
                    listing.middle_name.trim(),
                    listing.last_name.trim(),
                ]
                .iter()
                .filter(|part| !part.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
                if name.is_empty() {
                    return Err(TransformError::MissingName(listing.id));
                }
                Ok(NewEntity {
                    name,
                    email: canonical_email(listing.id, profile.email.as_deref())?,
                    kind: EntityKind::Mp,
                    source_ref,
                })
            }
            Self::Committee {
                listing,
                profile,
                source_ref,
            } => {
                let name = listing.name.trim().to_string();
                if name.is_empty() {
                    return Err(TransformError::MissingName(listing.id));
                }
                Ok(NewEntity {
                    name,
                    email: canonical_email(listing.id, profile.email.as_deref())?,
                    kind: EntityKind::Committee,
                    source_ref,
                })
            }
        }
    }
}
