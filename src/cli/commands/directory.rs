use crate::directory::{parliament::DEFAULT_DIRECTORY_URL, SyncConfig};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_DIRECTORY_URL: &str = "directory-url";
pub const ARG_DIRECTORY_BATCH_SIZE: &str = "directory-batch-size";
pub const ARG_DIRECTORY_BATCH_DELAY_MS: &str = "directory-batch-delay-ms";
pub const ARG_DIRECTORY_TIMEOUT_SECONDS: &str = "directory-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub timeout: Duration,
}

impl Options {
    /// Parse directory arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the directory URL is empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let url = match matches.get_one::<String>(ARG_DIRECTORY_URL) {
            Some(value) if !value.trim().is_empty() => value.trim().to_string(),
            _ => anyhow::bail!("missing required argument: --{ARG_DIRECTORY_URL}"),
        };

        Ok(Self {
            url,
            batch_size: usize::from(
                matches
                    .get_one::<u16>(ARG_DIRECTORY_BATCH_SIZE)
                    .copied()
                    .unwrap_or(5),
            ),
            batch_delay: Duration::from_millis(
                matches
                    .get_one::<u64>(ARG_DIRECTORY_BATCH_DELAY_MS)
                    .copied()
                    .unwrap_or(1000),
            ),
            timeout: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_DIRECTORY_TIMEOUT_SECONDS)
                    .copied()
                    .unwrap_or(30),
            ),
        })
    }

    #[must_use]
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::new()
            .with_batch_size(self.batch_size)
            .with_batch_delay(self.batch_delay)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DIRECTORY_URL)
                .long(ARG_DIRECTORY_URL)
                .help("Base URL of the parliament directory API")
                .env("GLAS_DIRECTORY_URL")
                .default_value(DEFAULT_DIRECTORY_URL)
                .global(true),
        )
        .arg(
            Arg::new(ARG_DIRECTORY_BATCH_SIZE)
                .long(ARG_DIRECTORY_BATCH_SIZE)
                .help("Profile fetches issued concurrently per batch")
                .env("GLAS_DIRECTORY_BATCH_SIZE")
                .default_value("5")
                .global(true)
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
        .arg(
            Arg::new(ARG_DIRECTORY_BATCH_DELAY_MS)
                .long(ARG_DIRECTORY_BATCH_DELAY_MS)
                .help("Pause between profile batches in milliseconds")
                .env("GLAS_DIRECTORY_BATCH_DELAY_MS")
                .default_value("1000")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_DIRECTORY_TIMEOUT_SECONDS)
                .long(ARG_DIRECTORY_TIMEOUT_SECONDS)
                .help("Deadline for a single directory request in seconds")
                .env("GLAS_DIRECTORY_TIMEOUT_SECONDS")
                .default_value("30")
                .global(true)
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
