/// Report rendering for the CLI
use crate::{
    error::{SyncError, SyncResult},
    identity::BatchOutcome,
    sync::{SyncReport, TeamStatus},
};
use clap::ValueEnum;
use serde::Serialize;
use std::fmt::Write;

/// Output format for command results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Serializable view of one identity resolution
#[derive(Debug, Serialize)]
pub struct ResolutionView<'a> {
    pub identity: &'a str,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub from_cache: bool,
    pub duration_ms: u64,
}

/// Serializable view of a batch
#[derive(Debug, Serialize)]
pub struct BatchView<'a> {
    pub total: usize,
    pub resolved: usize,
    pub errors: usize,
    pub cache_hits: usize,
    pub cancelled: usize,
    pub duration_ms: u64,
    pub results: Vec<ResolutionView<'a>>,
}

impl<'a> From<&'a BatchOutcome> for BatchView<'a> {
    fn from(batch: &'a BatchOutcome) -> Self {
        Self {
            total: batch.total,
            resolved: batch.resolved,
            errors: batch.errors,
            cache_hits: batch.cache_hits,
            cancelled: batch.cancelled,
            duration_ms: batch.duration.as_millis() as u64,
            results: batch
                .results
                .iter()
                .map(|r| ResolutionView {
                    identity: &r.input,
                    resolved: r.resolved,
                    value: r.resolved_value.as_deref(),
                    error: r.error.as_ref().map(ToString::to_string),
                    from_cache: r.from_cache,
                    duration_ms: r.duration.as_millis() as u64,
                })
                .collect(),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> SyncResult<String> {
    serde_json::to_string_pretty(value).map_err(SyncError::from)
}

/// Render a sync report
pub fn render_report(report: &SyncReport, format: OutputFormat) -> SyncResult<String> {
    if format == OutputFormat::Json {
        return to_json(report);
    }

    let mut out = String::new();
    let mode = if report.dry_run { " (dry run)" } else { "" };
    // fmt::Write on String cannot fail
    let _ = writeln!(out, "Run {}{}", report.run_id, mode);

    for team in &report.teams {
        let _ = write!(
            out,
            "  {:<10} {} ({} members",
            team.status, team.name, team.members_resolved
        );
        if team.attempts > 1 {
            let _ = write!(out, ", {} attempts", team.attempts);
        }
        let _ = writeln!(out, ")");

        if let Some(error) = &team.error {
            let _ = writeln!(out, "             error: {}", error);
        }
        for member in &team.unresolved {
            let _ = writeln!(out, "             unresolved: {} ({})", member.email, member.reason);
        }
    }

    let r = &report.resolution;
    let _ = writeln!(
        out,
        "Identities: {} total, {} resolved, {} errors, {} cache hits, {} cancelled",
        r.total, r.resolved, r.errors, r.cache_hits, r.cancelled
    );
    let _ = writeln!(
        out,
        "Teams: {} applied, {} planned, {} skipped, {} failed, {} cancelled in {}ms",
        report.count(TeamStatus::Applied),
        report.count(TeamStatus::Planned),
        report.count(TeamStatus::Skipped),
        report.count(TeamStatus::Failed),
        report.count(TeamStatus::Cancelled),
        report.duration_ms
    );
    Ok(out)
}

/// Render a bare batch resolution
pub fn render_batch(batch: &BatchOutcome, format: OutputFormat) -> SyncResult<String> {
    if format == OutputFormat::Json {
        return to_json(&BatchView::from(batch));
    }

    let mut out = String::new();
    for r in &batch.results {
        match (&r.resolved_value, &r.error) {
            (Some(value), _) => {
                let cached = if r.from_cache { " (cached)" } else { "" };
                let _ = writeln!(out, "{} -> {}{}", r.input, value, cached);
            }
            (None, Some(err)) => {
                let _ = writeln!(out, "{} !! {}", r.input, err);
            }
            (None, None) => {
                let _ = writeln!(out, "{} !! unresolved", r.input);
            }
        }
    }
    let _ = writeln!(
        out,
        "{} of {} resolved ({} cache hits) in {}ms",
        batch.resolved,
        batch.total,
        batch.cache_hits,
        batch.duration.as_millis()
    );
    Ok(out)
}
