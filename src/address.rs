//! Email address helpers shared by request validation and directory sync.

use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Normalize an email for hashing and reconciliation.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// Lowercase alphanumeric characters of `part`, for use in a local part.
fn local_part_fragment(part: &str) -> String {
    part.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Build `name.surname@domain` for the citizen's reply address. Empty
/// fragments are skipped; `None` if nothing usable remains.
#[must_use]
pub fn reply_to_address(name: &str, surname: &str, domain: &str) -> Option<String> {
    let local = [name, surname]
        .iter()
        .map(|part| local_part_fragment(part))
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(".");
    if local.is_empty() {
        None
    } else {
        Some(format!("{local}@{domain}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Ana@Example.COM "), "ana@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@parliament.bg"));
    }

    #[test]
    fn valid_email_rejects_malformed() {
        assert!(!valid_email(""));
        assert!(!valid_email("no-at-sign.bg"));
        assert!(!valid_email("two@@example.com"));
        assert!(!valid_email("space in@example.com"));
        assert!(!valid_email("user@localhost"));
    }

    #[test]
    fn reply_to_uses_lowercase_alphanumerics() {
        assert_eq!(
            reply_to_address("Ana-Maria", "O'Neil", "glas.bg").as_deref(),
            Some("anamaria.oneil@glas.bg")
        );
    }

    #[test]
    fn reply_to_keeps_cyrillic_letters() {
        assert_eq!(
            reply_to_address("Иван", "Петров", "glas.bg").as_deref(),
            Some("иван.петров@glas.bg")
        );
    }

    #[test]
    fn reply_to_skips_empty_parts() {
        assert_eq!(
            reply_to_address("Ana", "--", "glas.bg").as_deref(),
            Some("ana@glas.bg")
        );
        assert_eq!(reply_to_address("!", "?", "glas.bg"), None);
    }
}
