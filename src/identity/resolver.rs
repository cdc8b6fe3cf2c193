/// Batch Resolver - Orchestrates cached, bounded-concurrency identity lookups
use crate::{
    error::{ErrorKind, SyncError},
    identity::{
        normalize_identity, BatchOutcome, CacheEntry, CacheStats, CachedResolution,
        IdentityCache, IdentityProvider, ResolutionOutcome,
    },
    metrics,
    retry::{self, RetryPolicy, RetryResult},
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of lookups allowed in flight at once
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Upper bound on the admission gate capacity
pub const MAX_CONCURRENCY: usize = 1024;

/// Identity resolution configuration
#[derive(Debug, Clone)]
pub struct IdentityResolverConfig {
    /// Capacity of the admission gate
    pub concurrency: usize,
    /// Retry policy applied to every remote lookup
    pub policy: RetryPolicy,
}

impl Default for IdentityResolverConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            policy: RetryPolicy::remote_api(),
        }
    }
}

/// Resolves identities through the cache, falling back to the provider
///
/// The admission gate is owned by the resolver, so the in-flight bound holds
/// across concurrent `resolve_many` calls too. A gate token is held for the
/// whole retry loop of one lookup, backoff sleeps included.
pub struct BatchResolver {
    provider: Arc<dyn IdentityProvider>,
    cache: Arc<IdentityCache>,
    gate: Arc<Semaphore>,
    config: IdentityResolverConfig,
}

impl BatchResolver {
    /// Create a new resolver
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        cache: Arc<IdentityCache>,
        config: IdentityResolverConfig,
    ) -> Self {
        let capacity = config.concurrency.clamp(1, MAX_CONCURRENCY);
        Self {
            provider,
            cache,
            gate: Arc::new(Semaphore::new(capacity)),
            config,
        }
    }

    /// Resolve a single identity. Never fails; errors live in the outcome.
    ///
    /// Resolution order:
    /// 1. Cache (positive and negative entries short-circuit)
    /// 2. Admission gate
    /// 3. Provider lookup under the retry policy
    /// 4. Cache positive results and not-found results; other failures are
    ///    treated as possibly transient and left uncached
    pub async fn resolve_one(&self, cancel: &CancellationToken, identity: &str) -> ResolutionOutcome {
        let started = Instant::now();
        let key = normalize_identity(identity);

        if key.is_empty() {
            metrics::record_identity_resolution("invalid");
            return ResolutionOutcome::failed(
                identity,
                SyncError::Validation("Identity cannot be empty".to_string()),
                started.elapsed(),
                false,
            );
        }

        if let Some(entry) = self.cache.get(&key) {
            debug!("Identity cache hit: {}", key);
            metrics::record_identity_resolution("cache_hit");
            return match entry.resolution {
                CachedResolution::Found(value) => {
                    ResolutionOutcome::found(identity, value, started.elapsed(), true)
                }
                CachedResolution::NotFound(cause) => {
                    ResolutionOutcome::failed(identity, cause, started.elapsed(), true)
                }
            };
        }

        if cancel.is_cancelled() {
            metrics::record_identity_resolution("cancelled");
            return ResolutionOutcome::failed(identity, SyncError::Cancelled, started.elapsed(), false);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                metrics::record_identity_resolution("cancelled");
                return ResolutionOutcome::failed(identity, SyncError::Cancelled, started.elapsed(), false);
            }
            permit = self.gate.acquire() => permit,
        };
        let permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                return ResolutionOutcome::failed(
                    identity,
                    SyncError::Internal("Admission gate closed".to_string()),
                    started.elapsed(),
                    false,
                );
            }
        };

        let provider = &self.provider;
        let lookup_key = key.as_str();
        let outcome = retry::execute(cancel, &self.config.policy, "lookup_user", |token| {
            let provider = Arc::clone(provider);
            let lookup_key = lookup_key.to_string();
            async move { provider.lookup(&token, &lookup_key).await }
        })
        .await;
        drop(permit);

        match outcome.result {
            RetryResult::Success(value) => {
                self.cache.set(&key, CacheEntry::found(&key, value.clone()));
                metrics::record_identity_resolution("resolved");
                debug!(identity = %key, attempts = outcome.attempts, "Identity resolved");
                ResolutionOutcome::found(identity, value, started.elapsed(), false)
            }
            RetryResult::Failed(err) if self.config.policy.classify(&err) == ErrorKind::NotFound => {
                self.cache.set(&key, CacheEntry::not_found(&key, err.clone()));
                metrics::record_identity_resolution("not_found");
                info!(identity = %key, "Identity does not resolve; caching negative result");
                ResolutionOutcome::failed(identity, err, started.elapsed(), false)
            }
            RetryResult::Failed(err) => {
                metrics::record_identity_resolution("failed");
                warn!(
                    identity = %key,
                    attempts = outcome.attempts,
                    error = %err,
                    "Identity resolution failed"
                );
                ResolutionOutcome::failed(identity, err, started.elapsed(), false)
            }
            RetryResult::Cancelled => {
                metrics::record_identity_resolution("cancelled");
                ResolutionOutcome::failed(identity, SyncError::Cancelled, started.elapsed(), false)
            }
        }
    }

    /// Resolve many identities concurrently, preserving input order.
    ///
    /// Duplicates are resolved independently per position; once the first
    /// lookup lands in the cache the others become cache hits.
    pub async fn resolve_many<S: AsRef<str>>(
        &self,
        cancel: &CancellationToken,
        identities: &[S],
    ) -> BatchOutcome {
        if identities.is_empty() {
            return BatchOutcome::default();
        }

        let started = Instant::now();
        let mut pending: FuturesUnordered<_> = identities
            .iter()
            .enumerate()
            .map(|(idx, identity)| async move {
                (idx, self.resolve_one(cancel, identity.as_ref()).await)
            })
            .collect();

        let mut slots: Vec<Option<ResolutionOutcome>> = vec![None; identities.len()];
        while let Some((idx, outcome)) = pending.next().await {
            slots[idx] = Some(outcome);
        }

        let results: Vec<ResolutionOutcome> = slots.into_iter().flatten().collect();
        debug_assert_eq!(results.len(), identities.len());

        let batch = BatchOutcome::from_results(results, started.elapsed());
        info!(
            total = batch.total,
            resolved = batch.resolved,
            errors = batch.errors,
            cache_hits = batch.cache_hits,
            cancelled = batch.cancelled,
            duration_ms = batch.duration.as_millis() as u64,
            "Identity batch resolved"
        );
        batch
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    pub fn config(&self) -> &IdentityResolverConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Directory stub with call accounting
    #[derive(Default)]
    struct StubProvider {
        users: HashMap<String, String>,
        /// Identities failing transiently this many times before succeeding
        flaky: HashMap<String, usize>,
        /// Identities failing with an untagged error carrying this message
        opaque: HashMap<String, String>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        failures_seen: parking_lot::Mutex<HashMap<String, usize>>,
    }

    impl StubProvider {
        fn with_users(n: usize) -> Self {
            let users = (0..n)
                .map(|i| (format!("user{}@example.com", i), format!("u-{}", i)))
                .collect();
            Self {
                users,
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityProvider for StubProvider {
        async fn lookup(&self, _cancel: &CancellationToken, identity: &str) -> SyncResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(message) = self.opaque.get(identity) {
                return Err(SyncError::Remote(message.clone()));
            }

            if let Some(limit) = self.flaky.get(identity) {
                let mut seen = self.failures_seen.lock();
                let count = seen.entry(identity.to_string()).or_insert(0);
                if *count < *limit {
                    *count += 1;
                    return Err(SyncError::Remote("upstream 503 service unavailable".into()));
                }
            }

            self.users
                .get(identity)
                .cloned()
                .ok_or_else(|| SyncError::NotFound(format!("No user with email {}", identity)))
        }
    }

    fn resolver_with(provider: Arc<StubProvider>, concurrency: usize) -> BatchResolver {
        let policy = RetryPolicy::remote_api()
            .with_delays(Duration::from_millis(10), Duration::from_millis(100))
            .with_jitter(0.0);
        BatchResolver::new(
            provider,
            Arc::new(IdentityCache::default()),
            IdentityResolverConfig {
                concurrency,
                policy,
            },
        )
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let provider = Arc::new(StubProvider::with_users(1));
        let resolver = resolver_with(provider.clone(), 10);
        let token = CancellationToken::new();

        let empty: Vec<String> = Vec::new();
        let batch = resolver.resolve_many(&token, &empty).await;

        assert_eq!(batch, BatchOutcome::default());
        assert_eq!(batch.duration, Duration::ZERO);
        assert_eq!(provider.calls(), 0);
        assert_eq!(resolver.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_positive_result_is_cached() {
        let provider = Arc::new(StubProvider::with_users(3));
        let resolver = resolver_with(provider.clone(), 10);
        let token = CancellationToken::new();

        let first = resolver.resolve_one(&token, "user1@example.com").await;
        assert!(first.resolved);
        assert!(!first.from_cache);
        assert_eq!(first.resolved_value.as_deref(), Some("u-1"));

        let second = resolver.resolve_one(&token, " USER1@example.com").await;
        assert!(second.resolved);
        assert!(second.from_cache);
        assert_eq!(second.input, " USER1@example.com");
        assert_eq!(second.resolved_value.as_deref(), Some("u-1"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_negative_result_is_cached() {
        let provider = Arc::new(StubProvider::with_users(1));
        let resolver = resolver_with(provider.clone(), 10);
        let token = CancellationToken::new();

        let first = resolver.resolve_one(&token, "ghost@example.com").await;
        assert!(!first.resolved);
        assert!(!first.from_cache);
        assert!(matches!(first.error, Some(SyncError::NotFound(_))));

        let second = resolver.resolve_one(&token, "ghost@example.com").await;
        assert!(!second.resolved);
        assert!(second.from_cache);
        assert!(matches!(second.error, Some(SyncError::NotFound(_))));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_opaque_not_found_is_cached_without_retry() {
        let mut stub = StubProvider::with_users(1);
        stub.opaque.insert(
            "ghost@example.com".into(),
            "user 5001 not found".into(),
        );
        let provider = Arc::new(stub);
        let resolver = resolver_with(provider.clone(), 10);
        let token = CancellationToken::new();

        let first = resolver.resolve_one(&token, "ghost@example.com").await;
        assert!(!first.resolved);
        assert_eq!(provider.calls(), 1);

        let entry = resolver.cache().get("ghost@example.com").unwrap();
        assert!(!entry.is_found());
        assert!(matches!(entry.error(), Some(SyncError::Remote(_))));

        let second = resolver.resolve_one(&token, "ghost@example.com").await;
        assert!(second.from_cache);
        assert_eq!(provider.calls(), 1);
    }

    #[test]
    fn test_gate_capacity_is_clamped() {
        let provider = Arc::new(StubProvider::with_users(1));
        let resolver = resolver_with(provider.clone(), usize::MAX / 2);
        assert_eq!(resolver.gate.available_permits(), MAX_CONCURRENCY);

        let resolver = resolver_with(provider, 0);
        assert_eq!(resolver.gate.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_not_cached() {
        let mut stub = StubProvider::with_users(2);
        stub.flaky.insert("user0@example.com".into(), 2);
        let provider = Arc::new(stub);
        let resolver = resolver_with(provider.clone(), 10);
        let token = CancellationToken::new();

        let outcome = resolver.resolve_one(&token, "user0@example.com").await;
        assert!(outcome.resolved);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_transient_failure_is_not_cached() {
        let mut stub = StubProvider::with_users(1);
        stub.flaky.insert("user0@example.com".into(), 100);
        let provider = Arc::new(stub);
        let mut resolver = resolver_with(provider.clone(), 10);
        resolver.config.policy.max_attempts = 2;
        let token = CancellationToken::new();

        let outcome = resolver.resolve_one(&token, "user0@example.com").await;
        assert!(!outcome.resolved);
        assert!(matches!(outcome.error, Some(SyncError::Remote(_))));
        assert_eq!(resolver.cache_stats().size, 0);

        // next call goes back to the provider
        resolver.resolve_one(&token, "user0@example.com").await;
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_empty_identity_is_rejected_without_lookup() {
        let provider = Arc::new(StubProvider::with_users(1));
        let resolver = resolver_with(provider.clone(), 10);
        let token = CancellationToken::new();

        let outcome = resolver.resolve_one(&token, "   ").await;
        assert!(matches!(outcome.error, Some(SyncError::Validation(_))));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_gate_bounds_in_flight_calls() {
        let mut stub = StubProvider::with_users(25);
        stub.delay = Duration::from_millis(20);
        let provider = Arc::new(stub);
        let resolver = resolver_with(provider.clone(), 10);
        let token = CancellationToken::new();

        let inputs: Vec<String> = (0..25).map(|i| format!("user{}@example.com", i)).collect();
        let batch = resolver.resolve_many(&token, &inputs).await;

        assert_eq!(batch.total, 25);
        assert_eq!(batch.resolved, 25);
        assert_eq!(provider.calls(), 25);
        let max = provider.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 10, "saw {} concurrent lookups", max);
        assert!(max > 1, "lookups never overlapped");
    }

    #[tokio::test]
    async fn test_order_preserved_with_duplicates() {
        let mut stub = StubProvider::with_users(5);
        stub.delay = Duration::from_millis(5);
        let provider = Arc::new(stub);
        let resolver = resolver_with(provider, 3);
        let token = CancellationToken::new();

        let inputs = vec![
            "user4@example.com",
            "user0@example.com",
            "missing@example.com",
            "User4@Example.com",
            "user2@example.com",
            "user0@example.com",
        ];
        let batch = resolver.resolve_many(&token, &inputs).await;

        assert_eq!(batch.results.len(), inputs.len());
        for (outcome, input) in batch.results.iter().zip(&inputs) {
            assert_eq!(&outcome.input, input);
        }
        assert_eq!(batch.results[0].resolved_value.as_deref(), Some("u-4"));
        assert_eq!(batch.results[3].resolved_value.as_deref(), Some("u-4"));
        assert_eq!(batch.results[5].resolved_value.as_deref(), Some("u-0"));
        assert!(!batch.results[2].resolved);
        assert_eq!(batch.resolved, 5);
        assert_eq!(batch.errors, 1);
    }

    #[tokio::test]
    async fn test_cancelled_batch_makes_no_calls() {
        let provider = Arc::new(StubProvider::with_users(5));
        let resolver = resolver_with(provider.clone(), 2);
        let token = CancellationToken::new();
        token.cancel();

        let inputs: Vec<String> = (0..5).map(|i| format!("user{}@example.com", i)).collect();
        let batch = resolver.resolve_many(&token, &inputs).await;

        assert_eq!(provider.calls(), 0);
        assert_eq!(batch.total, 5);
        assert_eq!(batch.cancelled, 5);
        assert_eq!(batch.errors, 0);
        assert!(batch.results.iter().all(|r| r.is_cancelled()));
        assert_eq!(resolver.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_stops_new_calls() {
        let mut stub = StubProvider::with_users(20);
        stub.delay = Duration::from_millis(50);
        let provider = Arc::new(stub);
        let resolver = resolver_with(provider.clone(), 2);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(75)).await;
            canceller.cancel();
        });

        let inputs: Vec<String> = (0..20).map(|i| format!("user{}@example.com", i)).collect();
        let batch = resolver.resolve_many(&token, &inputs).await;

        assert_eq!(batch.total, 20);
        assert!(batch.cancelled > 0);
        assert!(provider.calls() < 20);
        assert_eq!(batch.resolved + batch.cancelled + batch.errors, 20);
    }

    #[tokio::test]
    async fn test_cache_hits_survive_cancellation() {
        let provider = Arc::new(StubProvider::with_users(2));
        let resolver = resolver_with(provider.clone(), 2);
        let live = CancellationToken::new();
        resolver.resolve_one(&live, "user0@example.com").await;

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let batch = resolver
            .resolve_many(&cancelled, &["user0@example.com", "user1@example.com"])
            .await;

        assert!(batch.results[0].resolved);
        assert!(batch.results[0].from_cache);
        assert!(batch.results[1].is_cancelled());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let provider = Arc::new(StubProvider::with_users(2));
        let resolver = resolver_with(provider.clone(), 2);
        let token = CancellationToken::new();

        resolver.resolve_one(&token, "user0@example.com").await;
        assert_eq!(resolver.cache_stats().size, 1);

        resolver.clear_cache();
        assert_eq!(resolver.cache_stats().size, 0);

        resolver.resolve_one(&token, "user0@example.com").await;
        assert_eq!(provider.calls(), 2);
    }
}
