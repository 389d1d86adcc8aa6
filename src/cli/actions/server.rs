use super::store;
use crate::{
    api,
    cli::{
        commands::{directory, server::Options},
        telemetry::shutdown_tracer,
    },
    directory::{spawn_sync_worker, EntitySynchronizer, ParliamentDirectory},
    mail::{LogMailer, Mailer, MailtrapMailer},
    privacy::MailHasher,
    service::{CivicMail, ServiceConfig},
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub dsn: Option<String>,
    pub directory: directory::Options,
    pub options: Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if startup fails or the server stops with an error.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let store = store::open(args.dsn.as_deref()).await?;
    let options = args.options;

    let hasher = MailHasher::new(&options.hash_salt)?;

    let mailer: Arc<dyn Mailer> = match options.mailtrap_token {
        Some(token) => Arc::new(
            MailtrapMailer::new(&options.mailtrap_url, token)
                .context("Failed to build Mailtrap client")?,
        ),
        None => {
            warn!("no --mailtrap-token given, outgoing mail is only logged");
            Arc::new(LogMailer)
        }
    };

    let config = ServiceConfig::new(&options.sender_domain)
        .with_sender_local_part(&options.sender_local_part)
        .with_otp_ttl_minutes(options.otp_ttl_minutes)
        .with_rate_limit_hours(options.rate_limit_hours);

    let service = Arc::new(CivicMail::new(store.clone(), hasher, mailer, config));

    let worker = if options.sync_interval_hours > 0 {
        let source = ParliamentDirectory::new(&args.directory.url, args.directory.timeout)
            .context("Failed to build directory client")?;
        let synchronizer = Arc::new(EntitySynchronizer::new(
            store,
            Arc::new(source),
            args.directory.sync_config(),
        ));
        let interval = Duration::from_secs(options.sync_interval_hours.saturating_mul(60 * 60));
        Some(spawn_sync_worker(synchronizer, interval))
    } else {
        info!("periodic directory sync disabled");
        None
    };

    let result = api::serve(options.port, service, options.cors_origin.as_deref()).await;

    if let Some(worker) = worker {
        worker.abort();
    }
    shutdown_tracer();

    result
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.options.port)),
        (
            "dsn",
            args.dsn
                .as_deref()
                .map_or_else(|| "memory".to_string(), store::redact_dsn),
        ),
        (
            "sender",
            format!(
                "{}@{}",
                args.options.sender_local_part, args.options.sender_domain
            ),
        ),
        (
            "mailer",
            if args.options.mailtrap_token.is_some() {
                args.options.mailtrap_url.clone()
            } else {
                "log".to_string()
            },
        ),
        ("otp_ttl_minutes", args.options.otp_ttl_minutes.to_string()),
        ("rate_limit_hours", args.options.rate_limit_hours.to_string()),
        ("directory_url", args.directory.url.clone()),
        (
            "sync_interval_hours",
            args.options.sync_interval_hours.to_string(),
        ),
        (
            "cors_origin",
            args.options
                .cors_origin
                .clone()
                .unwrap_or_else(|| "*".to_string()),
        ),
    ];

    let width = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let lines: Vec<String> = entries
        .iter()
        .map(|(key, value)| format!("  {key:<width$}  {value}"))
        .collect();
    info!("Startup configuration:\n{}", lines.join("\n"));
}
