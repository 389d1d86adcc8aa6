//! One-time code issuance and verification.
//!
//! Every issued code is an `auth_attempts` record in state `sent`. A new
//! request for the same sender creates another record instead of touching the
//! previous one; verification only ever looks at the newest record, and only
//! while it is still `sent`.
//!
//! ```text
//! sent ──match──────▶ success
//!   │
//!   └──past expiry──▶ expired
//! ```
//!
//! A wrong code leaves the record in `sent`, so the citizen may retry until it
//! expires. Both transitions are conditional on the record still being `sent`,
//! which keeps a code from being redeemed twice by racing requests.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, Rng};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::privacy::MailHash;
use crate::store::{AuthAttempt, AuthState, NewAuthAttempt, RecordStore, StoreError};

pub const CODE_MIN: u32 = 100_000;
pub const CODE_MAX: u32 = 999_999;

/// Why a verification did or did not succeed. Callers outside this module
/// collapse every non-`Verified` case into one answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Verified,
    NoSession,
    Mismatch,
    Expired,
    /// The attempt left `sent` between our read and our write.
    Superseded,
}

impl Verification {
    #[must_use]
    pub const fn is_verified(self) -> bool {
        matches!(self, Self::Verified)
    }
}

fn generate_code() -> u32 {
    OsRng.gen_range(CODE_MIN..=CODE_MAX)
}

#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn RecordStore>,
    ttl: Duration,
}

impl Authenticator {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh code for `mail_hash`.
    ///
    /// # Errors
    /// Returns an error if the attempt cannot be persisted.
    pub async fn issue(&self, mail_hash: &MailHash) -> Result<(AuthAttempt, u32), StoreError> {
        self.issue_at(mail_hash, Utc::now()).await
    }

    /// [`Self::issue`] with an explicit clock.
    ///
    /// # Errors
    /// Returns an error if the attempt cannot be persisted.
    #[instrument(skip(self), fields(mail_hash = %mail_hash))]
    pub async fn issue_at(
        &self,
        mail_hash: &MailHash,
        now: DateTime<Utc>,
    ) -> Result<(AuthAttempt, u32), StoreError> {
        let code = generate_code();
        let attempt = self
            .store
            .create_auth_attempt(&NewAuthAttempt {
                mail_hash: mail_hash.clone(),
                code,
                expires_at: now + self.ttl,
                created_at: now,
            })
            .await?;
        debug!(attempt_id = %attempt.id, expires_at = %attempt.expires_at, "otp issued");
        Ok((attempt, code))
    }

    /// Check `code` against the live attempt for `mail_hash`.
    ///
    /// # Errors
    /// Store failures are returned as errors, never as a failed verification.
    pub async fn verify(
        &self,
        mail_hash: &MailHash,
        code: u32,
    ) -> Result<Verification, StoreError> {
        self.verify_at(mail_hash, code, Utc::now()).await
    }

    /// [`Self::verify`] with an explicit clock.
    ///
    /// # Errors
    /// Store failures are returned as errors, never as a failed verification.
    #[instrument(skip(self, code), fields(mail_hash = %mail_hash))]
    pub async fn verify_at(
        &self,
        mail_hash: &MailHash,
        code: u32,
        now: DateTime<Utc>,
    ) -> Result<Verification, StoreError> {
        let Some(attempt) = self.store.live_auth_attempt(mail_hash).await? else {
            debug!("no live otp session");
            return Ok(Verification::NoSession);
        };

        if now > attempt.expires_at {
            self.store
                .transition_auth_attempt(attempt.id, AuthState::Sent, AuthState::Expired)
                .await?;
            debug!(attempt_id = %attempt.id, "otp expired");
            return Ok(Verification::Expired);
        }

        if attempt.code != code {
            debug!(attempt_id = %attempt.id, "otp mismatch");
            return Ok(Verification::Mismatch);
        }

        let won = self
            .store
            .transition_auth_attempt(attempt.id, AuthState::Sent, AuthState::Success)
            .await?;
        if won {
            debug!(attempt_id = %attempt.id, "otp verified");
            Ok(Verification::Verified)
        } else {
            debug!(attempt_id = %attempt.id, "otp already consumed by a concurrent request");
            Ok(Verification::Superseded)
        }
    }
}
