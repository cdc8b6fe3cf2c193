/// Roster Sync - CI entry point
///
/// Parses arguments, sets up logging, and maps the command result onto the
/// process exit code. Ctrl-C cancels the run in flight.

use anyhow::Result;
use clap::Parser;
use roster_sync::{
    cli::{self, Cli},
    config::{LogFormat, SyncConfig},
};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration; `validate` can run without it
    let config = SyncConfig::from_env();

    let (level, format) = match &config {
        Ok(c) => (c.logging.level.clone(), c.logging.format),
        Err(_) => ("roster_sync=info".to_string(), LogFormat::Text),
    };
    init_logging(&level, format);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            trigger.cancel();
        }
    });

    match cli.execute(config, &cancel).await {
        Ok(status) => Ok(ExitCode::from(status.exit_code())),
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            Ok(ExitCode::from(cli::exit_code_for(&e)))
        }
    }
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("roster_sync=info"));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays machine-readable
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
