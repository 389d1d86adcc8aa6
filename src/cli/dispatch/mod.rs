//! Command-line argument dispatch.
//!
//! Maps validated matches to an [`Action`]: the `server` subcommand gets its
//! full runtime configuration, `sync` only needs the store and directory.

use crate::cli::actions::{server, sync, Action};
use crate::cli::commands::{self, directory, ARG_DSN, CMD_SERVER, CMD_SYNC};
use anyhow::{anyhow, Result};
use clap::ArgMatches;

fn dsn(matches: &ArgMatches) -> Option<String> {
    matches
        .get_one::<String>(ARG_DSN)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_SERVER, sub)) => Ok(Action::Server(server::Args {
            dsn: dsn(sub),
            directory: directory::Options::parse(sub)?,
            options: commands::server::Options::parse(sub)?,
        })),
        Some((CMD_SYNC, sub)) => Ok(Action::Sync(sync::Args {
            dsn: dsn(sub),
            directory: directory::Options::parse(sub)?,
        })),
        Some((name, _)) => Err(anyhow!("unknown subcommand: {name}")),
        None => Err(anyhow!("missing subcommand")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn server_requires_sender_domain() {
        temp_env::with_vars(
            [
                ("GLAS_HASH_SALT", Some("pepper")),
                ("GLAS_SENDER_DOMAIN", None::<&str>),
                ("GLAS_DSN", None),
            ],
            || {
                let matches = commands::new().get_matches_from(vec!["glas", "server"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err
                        .to_string()
                        .contains("missing required argument: --sender-domain"));
                }
            },
        );
    }

    #[test]
    fn server_action_carries_options() {
        temp_env::with_vars(
            [
                ("GLAS_HASH_SALT", Some("pepper")),
                ("GLAS_SENDER_DOMAIN", Some("glas.bg")),
                ("GLAS_DSN", Some("postgres://glas@localhost:5432/glas")),
                ("GLAS_PORT", None),
            ],
            || {
                let matches =
                    commands::new().get_matches_from(vec!["glas", "server", "--port", "9090"]);
                match handler(&matches) {
                    Ok(Action::Server(args)) => {
                        assert_eq!(args.options.port, 9090);
                        assert_eq!(args.options.sender_domain, "glas.bg");
                        assert_eq!(
                            args.dsn.as_deref(),
                            Some("postgres://glas@localhost:5432/glas")
                        );
                    }
                    other => panic!("unexpected dispatch result: {other:?}"),
                }
            },
        );
    }

    #[test]
    fn sync_without_dsn_uses_memory() {
        temp_env::with_vars(
            [
                ("GLAS_DSN", Some("")),
                ("GLAS_DIRECTORY_BATCH_DELAY_MS", None::<&str>),
            ],
            || {
                let matches = commands::new().get_matches_from(vec![
                    "glas",
                    "sync",
                    "--directory-batch-delay-ms",
                    "250",
                ]);
                match handler(&matches) {
                    Ok(Action::Sync(args)) => {
                        assert!(args.dsn.is_none());
                        assert_eq!(args.directory.batch_delay, Duration::from_millis(250));
                        assert_eq!(args.directory.batch_size, 5);
                    }
                    other => panic!("unexpected dispatch result: {other:?}"),
                }
            },
        );
    }
}
