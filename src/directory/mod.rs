//! External entity directory and roster synchronization.
//!
//! A [`DirectorySource`] yields a roster of listings per [`Category`] and
//! resolves each listing into a full [`DirectoryRecord`] with its contact
//! address. The [`EntitySynchronizer`] drives a source in throttled batches
//! and reconciles the result against the stored entities of that category.
pub mod parliament;
pub mod records;
pub mod sync;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::EntityKind;

pub use parliament::ParliamentDirectory;
pub use records::{
    CommitteeListing, CommitteeProfile, DirectoryRecord, MpListing, MpProfile, TransformError,
};
pub use sync::{spawn_sync_worker, EntitySynchronizer, SyncConfig, SyncError, SyncReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Mps,
    Committees,
}

impl Category {
    /// Categories in the order a full sync visits them.
    pub const ALL: [Self; 2] = [Self::Mps, Self::Committees];

    #[must_use]
    pub const fn kind(self) -> EntityKind {
        match self {
            Self::Mps => EntityKind::Mp,
            Self::Committees => EntityKind::Committee,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mps => "mps",
            Self::Committees => "committees",
        })
    }
}

/// One roster entry, before its profile has been fetched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Listing {
    Mp(MpListing),
    Committee(CommitteeListing),
}

impl Listing {
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Mp(listing) => listing.id,
            Self::Committee(listing) => listing.id,
        }
    }
}

impl From<MpListing> for Listing {
    fn from(listing: MpListing) -> Self {
        Self::Mp(listing)
    }
}

impl From<CommitteeListing> for Listing {
    fn from(listing: CommitteeListing) -> Self {
        Self::Committee(listing)
    }
}

/// Listings for one category. Entries that did not decode are only counted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    pub listings: Vec<Listing>,
    pub malformed: usize,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("directory returned an unexpected body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid directory url: {0}")]
    Url(#[from] url::ParseError),
    #[error("directory has no data at {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Fetch the roster of `category`.
    async fn roster(&self, category: Category) -> Result<Roster, DirectoryError>;

    /// Fetch the profile behind `listing`.
    async fn resolve(&self, listing: &Listing) -> Result<DirectoryRecord, DirectoryError>;
}
