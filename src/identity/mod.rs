/// Identity Resolution System
///
/// Turns member emails into the remote API's opaque user ids with an
/// in-memory cache and bounded-concurrency batch lookups.

pub mod cache;
pub mod provider;
pub mod resolver;

pub use cache::{normalize_identity, CacheEntry, CacheStats, CachedResolution, IdentityCache};
pub use provider::{HttpIdentityProvider, IdentityProvider};
pub use resolver::{BatchResolver, IdentityResolverConfig, DEFAULT_CONCURRENCY, MAX_CONCURRENCY};

use crate::error::SyncError;
use std::time::Duration;

/// Result of resolving a single identity
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionOutcome {
    /// Identity exactly as requested
    pub input: String,
    pub resolved_value: Option<String>,
    pub resolved: bool,
    pub error: Option<SyncError>,
    pub duration: Duration,
    pub from_cache: bool,
}

impl ResolutionOutcome {
    pub(crate) fn found(input: &str, value: String, duration: Duration, from_cache: bool) -> Self {
        Self {
            input: input.to_string(),
            resolved_value: Some(value),
            resolved: true,
            error: None,
            duration,
            from_cache,
        }
    }

    pub(crate) fn failed(input: &str, error: SyncError, duration: Duration, from_cache: bool) -> Self {
        Self {
            input: input.to_string(),
            resolved_value: None,
            resolved: false,
            error: Some(error),
            duration,
            from_cache,
        }
    }

    /// Lookup was abandoned because the caller cancelled
    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().map_or(false, SyncError::is_cancelled)
    }
}

/// Ordered results of a batch resolution plus aggregate counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// One entry per input, in input order
    pub results: Vec<ResolutionOutcome>,
    pub total: usize,
    pub resolved: usize,
    /// Failed lookups, cancellations excluded
    pub errors: usize,
    pub cache_hits: usize,
    pub cancelled: usize,
    /// Wall-clock time for the whole batch
    pub duration: Duration,
}

impl BatchOutcome {
    /// Build aggregates by scanning completed outcomes
    pub(crate) fn from_results(results: Vec<ResolutionOutcome>, duration: Duration) -> Self {
        let mut outcome = BatchOutcome {
            total: results.len(),
            duration,
            ..Default::default()
        };
        for r in &results {
            if r.resolved {
                outcome.resolved += 1;
            } else if r.is_cancelled() {
                outcome.cancelled += 1;
            } else {
                outcome.errors += 1;
            }
            if r.from_cache {
                outcome.cache_hits += 1;
            }
        }
        outcome.results = results;
        outcome
    }

    /// Resolved value for `identity`, matched on the normalized form
    pub fn value_for(&self, identity: &str) -> Option<&str> {
        self.outcome_for(identity)
            .and_then(|r| r.resolved_value.as_deref())
    }

    /// First outcome whose input normalizes to the same key as `identity`
    pub fn outcome_for(&self, identity: &str) -> Option<&ResolutionOutcome> {
        let key = normalize_identity(identity);
        self.results
            .iter()
            .find(|r| normalize_identity(&r.input) == key)
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &ResolutionOutcome> {
        self.results.iter().filter(|r| !r.resolved)
    }
}
