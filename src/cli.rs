//! CLI argument parsing and command dispatch

use crate::{
    config::SyncConfig,
    context::AppContext,
    error::{SyncError, SyncResult},
    manifest, metrics,
    output::{self, OutputFormat},
    sync::{self, SyncOptions, SyncRunner},
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code for configuration and usage errors
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Roster Sync - apply declarative team manifests to the management API
#[derive(Parser, Debug)]
#[command(name = "roster-sync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Maximum number of identity lookups in flight
    #[arg(long, global = true, value_name = "N")]
    pub concurrency: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve members and apply team manifests
    Apply(ApplyArgs),
    /// Resolve emails to user ids
    Resolve(ResolveArgs),
    /// Check connectivity to the management API
    Check,
    /// Validate manifests without contacting the API
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Manifest files or directories
    #[arg(required = true, value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// Resolve and report without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Skip teams with unresolved members
    #[arg(long)]
    pub strict: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Emails to resolve
    #[arg(required = true, value_name = "EMAILS")]
    pub emails: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Manifest files or directories
    #[arg(required = true, value_name = "PATHS")]
    pub paths: Vec<PathBuf>,
}

/// How a command finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// Ran to completion but something was not applied or resolved
    Failures,
}

impl CommandStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            CommandStatus::Success => 0,
            CommandStatus::Failures => 1,
        }
    }
}

/// Exit code for an error that escaped a command
pub fn exit_code_for(err: &SyncError) -> u8 {
    match err {
        SyncError::Config(_) | SyncError::Manifest(_) | SyncError::Validation(_) => {
            EXIT_CONFIG_ERROR
        }
        _ => 1,
    }
}

impl Cli {
    /// Execute the command. `config` is only required by commands that talk
    /// to the API, so `validate` works without any environment set up.
    pub async fn execute(
        self,
        config: SyncResult<SyncConfig>,
        cancel: &CancellationToken,
    ) -> SyncResult<CommandStatus> {
        if let Command::Validate(args) = &self.command {
            return validate(args);
        }

        let mut config = config?;
        if let Some(concurrency) = self.concurrency {
            config.resolver.concurrency = concurrency;
        }
        let ctx = AppContext::new(config)?;

        let status = match &self.command {
            Command::Apply(args) => apply(&ctx, args, cancel).await?,
            Command::Resolve(args) => resolve(&ctx, args, cancel).await?,
            Command::Check => check(&ctx, cancel).await?,
            Command::Validate(args) => validate(args)?,
        };

        if let Some(path) = &ctx.config.metrics.textfile {
            match metrics::write_textfile(path) {
                Ok(()) => info!("Wrote metrics to {}", path.display()),
                Err(e) => warn!("Failed to write metrics textfile {}: {}", path.display(), e),
            }
        }

        Ok(status)
    }
}

async fn apply(
    ctx: &AppContext,
    args: &ApplyArgs,
    cancel: &CancellationToken,
) -> SyncResult<CommandStatus> {
    let manifests = manifest::load_manifests(&args.paths)?;
    let runner = SyncRunner::new(
        Arc::clone(&ctx.resolver),
        Arc::new(ctx.client.clone()),
        ctx.apply_policy.clone(),
    );

    let report = runner
        .run(
            cancel,
            &manifests,
            SyncOptions {
                dry_run: args.dry_run,
                strict: args.strict,
            },
        )
        .await;

    print!("{}", output::render_report(&report, args.format)?);

    if report.has_failures() {
        Ok(CommandStatus::Failures)
    } else {
        Ok(CommandStatus::Success)
    }
}

async fn resolve(
    ctx: &AppContext,
    args: &ResolveArgs,
    cancel: &CancellationToken,
) -> SyncResult<CommandStatus> {
    let batch = ctx.resolver.resolve_many(cancel, &args.emails).await;
    print!("{}", output::render_batch(&batch, args.format)?);

    if batch.resolved == batch.total {
        Ok(CommandStatus::Success)
    } else {
        Ok(CommandStatus::Failures)
    }
}

async fn check(ctx: &AppContext, cancel: &CancellationToken) -> SyncResult<CommandStatus> {
    let outcome = sync::check_connectivity(cancel, &ctx.client, &ctx.probe_policy).await;
    let attempts = outcome.attempts;

    match outcome.into_result() {
        Ok(()) => {
            println!("{} is reachable ({} attempt(s))", ctx.client.base_url(), attempts);
            Ok(CommandStatus::Success)
        }
        Err(e) => {
            println!("{} is unreachable: {}", ctx.client.base_url(), e);
            Ok(CommandStatus::Failures)
        }
    }
}

fn validate(args: &ValidateArgs) -> SyncResult<CommandStatus> {
    let manifests = manifest::load_manifests(&args.paths)?;
    let members: usize = manifests.iter().map(|m| m.members.len()).sum();
    println!("{} team manifests valid ({} members)", manifests.len(), members);
    Ok(CommandStatus::Success)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "roster-sync",
            "apply",
            "teams/",
            "extra.yaml",
            "--dry-run",
            "--format",
            "json",
            "--concurrency",
            "4",
        ])
        .unwrap();

        assert_eq!(cli.concurrency, Some(4));
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.paths.len(), 2);
                assert!(args.dry_run);
                assert!(!args.strict);
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_apply_requires_paths() {
        assert!(Cli::try_parse_from(["roster-sync", "apply"]).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CommandStatus::Success.exit_code(), 0);
        assert_eq!(CommandStatus::Failures.exit_code(), 1);
        assert_eq!(exit_code_for(&SyncError::Config("x".into())), 2);
        assert_eq!(exit_code_for(&SyncError::Transient("x".into())), 1);
    }

    #[tokio::test]
    async fn test_validate_runs_without_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ops.yaml"),
            "kind: Team\nname: ops\nmembers:\n  - email: a@example.com\n",
        )
        .unwrap();

        let cli = Cli::try_parse_from([
            "roster-sync".into(),
            "validate".into(),
            dir.path().display().to_string(),
        ])
        .unwrap();

        let status = cli
            .execute(
                Err(SyncError::Config("ROSTER_API_URL is required".into())),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(status, CommandStatus::Success);
    }

    #[tokio::test]
    async fn test_network_commands_need_config() {
        let cli = Cli::try_parse_from(["roster-sync", "check"]).unwrap();
        let err = cli
            .execute(
                Err(SyncError::Config("ROSTER_API_URL is required".into())),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(exit_code_for(&err), EXIT_CONFIG_ERROR);
    }
}
