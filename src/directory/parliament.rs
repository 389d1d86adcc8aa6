//! `parliament.bg` JSON API source.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info_span, warn, Instrument};
use url::Url;

use super::{
    records::MpRoster, Category, CommitteeProfile, DirectoryError,
    DirectoryRecord, DirectorySource, Listing, MpProfile, Roster,
};

pub const DEFAULT_DIRECTORY_URL: &str = "https://parliament.bg/api/v1";

// The site rejects non-browser agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Clone, Debug)]
pub struct ParliamentDirectory {
    client: Client,
    base: Url,
}

impl ParliamentDirectory {
    /// # Errors
    /// Returns an error if `base_url` does not parse or the client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, DirectoryError> {
        Ok(self.base.join(path)?)
    }

    async fn fetch<T: DeserializeOwned>(&self, url: &Url) -> Result<T, DirectoryError> {
        let span = info_span!("directory.fetch", url = %url);
        async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await?
                .error_for_status()?;
            let body = response.bytes().await?;
            let value: Option<T> = serde_json::from_slice(&body)?;
            value.ok_or_else(|| DirectoryError::Unavailable(url.to_string()))
        }
        .instrument(span)
        .await
    }
}

/// Decode each roster item on its own so one bad entry does not sink the list.
fn decode_items<T: DeserializeOwned>(
    items: Vec<serde_json::Value>,
    wrap: fn(T) -> Listing,
) -> Roster {
    let mut roster = Roster::default();
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(listing) => roster.listings.push(wrap(listing)),
            Err(err) => {
                warn!("skipping malformed directory listing: {err}");
                roster.malformed += 1;
            }
        }
    }
    roster
}

#[async_trait]
impl DirectorySource for ParliamentDirectory {
    async fn roster(&self, category: Category) -> Result<Roster, DirectoryError> {
        let roster = match category {
            Category::Mps => {
                let url = self.endpoint("coll-list-ns/bg")?;
                let page: MpRoster = self.fetch(&url).await?;
                decode_items(page.items, Listing::Mp)
            }
            Category::Committees => {
                let url = self.endpoint("coll-list/bg/3")?;
                let items: Vec<serde_json::Value> = self.fetch(&url).await?;
                decode_items(items, Listing::Committee)
            }
        };
        debug!(
            %category,
            listings = roster.listings.len(),
            malformed = roster.malformed,
            "directory roster fetched"
        );
        Ok(roster)
    }

    async fn resolve(&self, listing: &Listing) -> Result<DirectoryRecord, DirectoryError> {
        match listing {
            Listing::Mp(listing) => {
                let url = self.endpoint(&format!("mp-profile/bg/{}", listing.id))?;
                let profile: MpProfile = self.fetch(&url).await?;
                Ok(DirectoryRecord::Mp {
                    listing: listing.clone(),
                    profile,
                    source_ref: url.to_string(),
                })
            }
            Listing::Committee(listing) => {
                let url = self.endpoint(&format!("coll-list-mp/bg/{}/3", listing.id))?;
                let profile: CommitteeProfile = self.fetch(&url).await?;
                Ok(DirectoryRecord::Committee {
                    listing: listing.clone(),
                    profile,
                    source_ref: url.to_string(),
                })
            }
        }
    }
}
