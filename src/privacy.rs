//! Salted, one-way email digests.
//!
//! Rate limiting, deduplication and OTP bookkeeping key on a [`MailHash`]
//! instead of the address itself, so the `auth_attempts` and `sent_logs`
//! collections never hold a raw email. The digest is HMAC-SHA256 keyed with
//! the process-wide salt and rendered as lowercase hex.

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Opaque sender identifier derived from an email address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MailHash(String);

impl MailHash {
    /// Wrap a digest previously produced by [`MailHasher::hash`] and read
    /// back from storage.
    #[must_use]
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MailHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
pub struct MailHasher {
    mac: HmacSha256,
}

impl MailHasher {
    /// Build a hasher keyed with `salt`.
    ///
    /// # Errors
    /// Returns an error if the salt cannot be used as an HMAC key.
    pub fn new(salt: &SecretString) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(salt.expose_secret().as_bytes())
            .map_err(|e| anyhow!("invalid hash salt: {e}"))?;
        Ok(Self { mac })
    }

    /// Deterministic digest of `email`. Callers normalize and validate first.
    #[must_use]
    pub fn hash(&self, email: &str) -> MailHash {
        let mut mac = self.mac.clone();
        mac.update(email.as_bytes());
        MailHash(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for MailHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailHasher").field("salt", &"***").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher(salt: &str) -> Result<MailHasher> {
        MailHasher::new(&SecretString::from(salt.to_string()))
    }

    #[test]
    fn hash_is_stable_for_fixed_salt() -> Result<()> {
        let hasher = hasher("pepper")?;
        let first = hasher.hash("ana@example.com");
        let second = hasher.hash("ana@example.com");
        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 64);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn hash_changes_with_salt() -> Result<()> {
        let a = hasher("pepper")?.hash("ana@example.com");
        let b = hasher("paprika")?.hash("ana@example.com");
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn hash_differs_per_address() -> Result<()> {
        let hasher = hasher("pepper")?;
        assert_ne!(hasher.hash("ana@example.com"), hasher.hash("ivan@example.com"));
        Ok(())
    }

    #[test]
    fn empty_input_still_hashes() -> Result<()> {
        let hasher = hasher("pepper")?;
        assert_eq!(hasher.hash(""), hasher.hash(""));
        Ok(())
    }

    #[test]
    fn debug_redacts_salt() -> Result<()> {
        let rendered = format!("{:?}", hasher("super-secret")?);
        assert!(!rendered.contains("super-secret"));
        Ok(())
    }
}
