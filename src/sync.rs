/// Sync Runner - resolves manifest members and applies teams
///
/// One run makes a single batch resolution over every member email across all
/// manifests, then applies each team in manifest order under the apply retry
/// policy. Cancellation stops further work; teams that were not reached are
/// reported as cancelled rather than failed.
use crate::{
    api::{ApplyResponse, ManagementApi, TeamMember, TeamPayload},
    error::ErrorKind,
    identity::{BatchOutcome, BatchResolver, CacheStats, ResolutionOutcome},
    manifest::TeamManifest,
    metrics,
    retry::{self, RetryOutcome, RetryPolicy, RetryResult},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Knobs for a single run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Resolve and report, but never call the apply endpoint
    pub dry_run: bool,
    /// Skip any team that has unresolved members
    pub strict: bool,
}

/// What happened to one team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamStatus {
    /// Applied to the remote API
    Applied,
    /// Dry run; would have been applied
    Planned,
    /// Not applied because of unresolved members in strict mode
    Skipped,
    Failed,
    Cancelled,
}

impl TeamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamStatus::Applied => "applied",
            TeamStatus::Planned => "planned",
            TeamStatus::Skipped => "skipped",
            TeamStatus::Failed => "failed",
            TeamStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TeamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A member email that did not resolve
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnresolvedMember {
    pub email: String,
    pub kind: ErrorKind,
    pub reason: String,
}

impl UnresolvedMember {
    /// Kind comes from the same policy that decided whether to retry
    fn from_outcome(outcome: &ResolutionOutcome, policy: &RetryPolicy) -> Self {
        let (kind, reason) = match &outcome.error {
            Some(err) => (policy.classify(err), err.to_string()),
            None => (ErrorKind::Unclassified, "unresolved".to_string()),
        };
        Self {
            email: outcome.input.clone(),
            kind,
            reason,
        }
    }
}

/// Per-team report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamReport {
    pub name: String,
    pub source: PathBuf,
    pub status: TeamStatus,
    /// Apply attempts made (0 when nothing was sent)
    pub attempts: u32,
    pub members_resolved: usize,
    pub unresolved: Vec<UnresolvedMember>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch counters copied out of the resolution phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionSummary {
    pub total: usize,
    pub resolved: usize,
    pub errors: usize,
    pub cache_hits: usize,
    pub cancelled: usize,
    pub duration_ms: u64,
}

impl From<&BatchOutcome> for ResolutionSummary {
    fn from(batch: &BatchOutcome) -> Self {
        Self {
            total: batch.total,
            resolved: batch.resolved,
            errors: batch.errors,
            cache_hits: batch.cache_hits,
            cancelled: batch.cancelled,
            duration_ms: batch.duration.as_millis() as u64,
        }
    }
}

/// Cache occupancy at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheSummary {
    pub size: usize,
    pub ttl_secs: u64,
}

impl From<CacheStats> for CacheSummary {
    fn from(stats: CacheStats) -> Self {
        Self {
            size: stats.size,
            ttl_secs: stats.ttl.as_secs(),
        }
    }
}

/// Full report of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub dry_run: bool,
    pub strict: bool,
    pub teams: Vec<TeamReport>,
    pub resolution: ResolutionSummary,
    pub cache: CacheSummary,
}

impl SyncReport {
    /// Anything other than applied or planned counts as a failure
    pub fn has_failures(&self) -> bool {
        self.teams
            .iter()
            .any(|t| !matches!(t.status, TeamStatus::Applied | TeamStatus::Planned))
    }

    pub fn was_cancelled(&self) -> bool {
        self.teams.iter().any(|t| t.status == TeamStatus::Cancelled)
            || self.resolution.cancelled > 0
    }

    pub fn count(&self, status: TeamStatus) -> usize {
        self.teams.iter().filter(|t| t.status == status).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.teams.iter().map(|t| t.unresolved.len()).sum()
    }
}

/// Drives resolution and apply for a set of manifests
pub struct SyncRunner {
    resolver: Arc<BatchResolver>,
    api: Arc<dyn ManagementApi>,
    policy: RetryPolicy,
}

impl SyncRunner {
    pub fn new(resolver: Arc<BatchResolver>, api: Arc<dyn ManagementApi>, policy: RetryPolicy) -> Self {
        Self {
            resolver,
            api,
            policy,
        }
    }

    /// Run the pipeline. Never fails as a whole; per-team problems are in the report.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        manifests: &[TeamManifest],
        options: SyncOptions,
    ) -> SyncReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        info!(
            %run_id,
            teams = manifests.len(),
            dry_run = options.dry_run,
            strict = options.strict,
            "Starting sync run"
        );

        let emails: Vec<&str> = manifests.iter().flat_map(|m| m.emails()).collect();
        let batch = self.resolver.resolve_many(cancel, &emails).await;

        // Outcomes come back in input order, so each manifest owns a contiguous slice
        let mut offset = 0;
        let mut teams = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            let count = manifest.members.len();
            let outcomes = &batch.results[offset..offset + count];
            offset += count;

            let report = self.process_team(cancel, manifest, outcomes, options).await;
            metrics::record_team_apply(report.status.as_str());
            teams.push(report);
        }

        let report = SyncReport {
            run_id,
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            dry_run: options.dry_run,
            strict: options.strict,
            teams,
            resolution: ResolutionSummary::from(&batch),
            cache: CacheSummary::from(self.resolver.cache_stats()),
        };

        info!(
            %run_id,
            applied = report.count(TeamStatus::Applied),
            planned = report.count(TeamStatus::Planned),
            skipped = report.count(TeamStatus::Skipped),
            failed = report.count(TeamStatus::Failed),
            cancelled = report.count(TeamStatus::Cancelled),
            duration_ms = report.duration_ms,
            "Sync run finished"
        );
        report
    }

    async fn process_team(
        &self,
        cancel: &CancellationToken,
        manifest: &TeamManifest,
        outcomes: &[ResolutionOutcome],
        options: SyncOptions,
    ) -> TeamReport {
        let mut members = Vec::with_capacity(outcomes.len());
        let mut unresolved = Vec::new();
        let mut member_cancelled = false;

        for (member, outcome) in manifest.members.iter().zip(outcomes) {
            match &outcome.resolved_value {
                Some(user_id) => members.push(TeamMember {
                    user_id: user_id.clone(),
                    role: member.role,
                }),
                None => {
                    member_cancelled |= outcome.is_cancelled();
                    unresolved.push(UnresolvedMember::from_outcome(
                        outcome,
                        &self.resolver.config().policy,
                    ));
                }
            }
        }

        let mut report = TeamReport {
            name: manifest.name.clone(),
            source: manifest.source.clone(),
            status: TeamStatus::Planned,
            attempts: 0,
            members_resolved: members.len(),
            unresolved,
            team_id: None,
            created: None,
            error: None,
        };

        // A partially resolved roster is never applied after cancellation
        if member_cancelled || cancel.is_cancelled() {
            report.status = TeamStatus::Cancelled;
            return report;
        }

        if !report.unresolved.is_empty() {
            for member in &report.unresolved {
                warn!(
                    team = %manifest.name,
                    email = %member.email,
                    kind = ?member.kind,
                    "Member did not resolve: {}",
                    member.reason
                );
            }
            if options.strict {
                report.status = TeamStatus::Skipped;
                report.error = Some(format!(
                    "{} member(s) could not be resolved",
                    report.unresolved.len()
                ));
                return report;
            }
        }

        if options.dry_run {
            debug!(team = %manifest.name, members = members.len(), "Dry run; not applying");
            return report;
        }

        let payload = TeamPayload {
            name: manifest.name.clone(),
            description: manifest.description.clone(),
            members,
        };
        let outcome = self.apply(cancel, &payload).await;
        report.attempts = outcome.attempts;

        match outcome.result {
            RetryResult::Success(response) => {
                info!(
                    team = %manifest.name,
                    team_id = %response.id,
                    created = response.created,
                    attempts = outcome.attempts,
                    "Team applied"
                );
                report.status = TeamStatus::Applied;
                report.team_id = Some(response.id);
                report.created = Some(response.created);
            }
            RetryResult::Failed(err) => {
                warn!(team = %manifest.name, attempts = outcome.attempts, error = %err, "Team apply failed");
                report.status = TeamStatus::Failed;
                report.error = Some(err.to_string());
            }
            RetryResult::Cancelled => {
                report.status = TeamStatus::Cancelled;
            }
        }
        report
    }

    async fn apply(
        &self,
        cancel: &CancellationToken,
        payload: &TeamPayload,
    ) -> RetryOutcome<ApplyResponse> {
        retry::execute(cancel, &self.policy, "apply_team", |_token| {
            let api = Arc::clone(&self.api);
            let payload = payload.clone();
            async move { api.apply_team(&payload).await }
        })
        .await
    }
}

/// Probe the management API under `policy`
pub async fn check_connectivity(
    cancel: &CancellationToken,
    api: &dyn ManagementApi,
    policy: &RetryPolicy,
) -> RetryOutcome<()> {
    retry::execute(cancel, policy, "ping", |_token| async move { api.ping().await }).await
}
