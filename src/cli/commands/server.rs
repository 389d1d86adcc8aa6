use crate::mail::mailtrap::DEFAULT_MAILTRAP_URL;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_PORT: &str = "port";
pub const ARG_HASH_SALT: &str = "hash-salt";
pub const ARG_OTP_TTL_MINUTES: &str = "otp-ttl-minutes";
pub const ARG_RATE_LIMIT_HOURS: &str = "rate-limit-hours";
pub const ARG_SENDER_DOMAIN: &str = "sender-domain";
pub const ARG_SENDER_LOCAL_PART: &str = "sender-local-part";
pub const ARG_MAILTRAP_TOKEN: &str = "mailtrap-token";
pub const ARG_MAILTRAP_URL: &str = "mailtrap-url";
pub const ARG_CORS_ORIGIN: &str = "cors-origin";
pub const ARG_SYNC_INTERVAL_HOURS: &str = "sync-interval-hours";

#[derive(Debug)]
pub struct Options {
    pub port: u16,
    pub hash_salt: SecretString,
    pub otp_ttl_minutes: u32,
    pub rate_limit_hours: u32,
    pub sender_domain: String,
    pub sender_local_part: String,
    pub mailtrap_token: Option<SecretString>,
    pub mailtrap_url: String,
    pub cors_origin: Option<String>,
    pub sync_interval_hours: u64,
}

impl Options {
    /// Parse `server` arguments from the subcommand matches.
    ///
    /// # Errors
    /// Returns an error if a required value is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // env vars set to "" reach us as empty strings
        let non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        // the salt keys every digest, so it is kept byte for byte
        let Some(hash_salt) = matches
            .get_one::<String>(ARG_HASH_SALT)
            .filter(|v| !v.trim().is_empty())
            .cloned()
        else {
            anyhow::bail!("missing required argument: --{ARG_HASH_SALT}");
        };
        let Some(sender_domain) = non_empty(ARG_SENDER_DOMAIN) else {
            anyhow::bail!("missing required argument: --{ARG_SENDER_DOMAIN}");
        };

        Ok(Self {
            port: matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080),
            hash_salt: SecretString::from(hash_salt),
            otp_ttl_minutes: matches
                .get_one::<u32>(ARG_OTP_TTL_MINUTES)
                .copied()
                .unwrap_or(10),
            rate_limit_hours: matches
                .get_one::<u32>(ARG_RATE_LIMIT_HOURS)
                .copied()
                .unwrap_or(168),
            sender_domain,
            sender_local_part: non_empty(ARG_SENDER_LOCAL_PART)
                .unwrap_or_else(|| "no-reply".to_string()),
            mailtrap_token: non_empty(ARG_MAILTRAP_TOKEN).map(SecretString::from),
            mailtrap_url: non_empty(ARG_MAILTRAP_URL)
                .unwrap_or_else(|| DEFAULT_MAILTRAP_URL.to_string()),
            cors_origin: non_empty(ARG_CORS_ORIGIN),
            sync_interval_hours: matches
                .get_one::<u64>(ARG_SYNC_INTERVAL_HOURS)
                .copied()
                .unwrap_or(24),
        })
    }
}

#[must_use]
pub fn subcommand() -> Command {
    let command = Command::new("server").about("Serve the letter API and keep entities in sync");
    let command = with_http_args(command);
    with_mail_args(command)
}

fn with_http_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("GLAS_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_CORS_ORIGIN)
                .long(ARG_CORS_ORIGIN)
                .help("Origin of the letter form allowed by CORS (any origin when unset)")
                .env("GLAS_CORS_ORIGIN"),
        )
        .arg(
            Arg::new(ARG_SYNC_INTERVAL_HOURS)
                .long(ARG_SYNC_INTERVAL_HOURS)
                .help("Hours between directory syncs, 0 disables the worker")
                .env("GLAS_SYNC_INTERVAL_HOURS")
                .default_value("24")
                .value_parser(clap::value_parser!(u64)),
        )
}

fn with_mail_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HASH_SALT)
                .long(ARG_HASH_SALT)
                .help("Secret salt for email digests")
                .long_help(
                    "Secret salt for email digests.\n\nRate limits and duplicate checks key on these digests, so changing the salt resets them.",
                )
                .env("GLAS_HASH_SALT")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_OTP_TTL_MINUTES)
                .long(ARG_OTP_TTL_MINUTES)
                .help("Minutes a one-time code stays valid")
                .env("GLAS_OTP_TTL_MINUTES")
                .default_value("10")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_HOURS)
                .long(ARG_RATE_LIMIT_HOURS)
                .help("Hours between two letters from the same address")
                .env("GLAS_RATE_LIMIT_HOURS")
                .default_value("168")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_SENDER_DOMAIN)
                .long(ARG_SENDER_DOMAIN)
                .help("Domain used for the sender and reply-to addresses")
                .env("GLAS_SENDER_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_SENDER_LOCAL_PART)
                .long(ARG_SENDER_LOCAL_PART)
                .help("Local part of the sender address")
                .env("GLAS_SENDER_LOCAL_PART")
                .default_value("no-reply"),
        )
        .arg(
            Arg::new(ARG_MAILTRAP_TOKEN)
                .long(ARG_MAILTRAP_TOKEN)
                .help("Mailtrap API token (mail is only logged when unset)")
                .env("GLAS_MAILTRAP_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_MAILTRAP_URL)
                .long(ARG_MAILTRAP_URL)
                .help("Mailtrap send endpoint")
                .env("GLAS_MAILTRAP_URL")
                .default_value(DEFAULT_MAILTRAP_URL),
        )
}
