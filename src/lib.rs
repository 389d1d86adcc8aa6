//! # Glas (civic letters)
//!
//! `glas` lets a citizen send a prewritten civic letter to a member of
//! parliament or a parliamentary committee, after proving control of their
//! email address with a one-time code.
//!
//! ## Letter flow
//!
//! - **`POST /request-otp`:** validates the request, checks the send gate and
//!   mails a six-digit code. The code is stored against a salted digest of the
//!   address, never the address itself.
//! - **`POST /verify-and-send`:** re-checks the gate, consumes the code with a
//!   compare-and-swap so it works exactly once, renders the template and mails
//!   the letter to the selected entity.
//!
//! ## Send gate
//!
//! One letter per address per rate-limit window (a week by default), and never
//! the same template twice from the same address.
//!
//! ## Entity directory
//!
//! Members of parliament and committees are pulled from the `parliament.bg`
//! API in throttled batches and reconciled per category, by email, against
//! the stored entities. Sync runs periodically inside `glas server` and on
//! demand with `glas sync`.

pub mod address;
pub mod api;
pub mod cli;
pub mod directory;
pub mod error;
pub mod gate;
pub mod mail;
pub mod otp;
pub mod privacy;
pub mod service;
pub mod store;
pub mod templates;

#[cfg(test)]
mod testing;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert_eq!(
            APP_USER_AGENT,
            format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        );
    }
}
