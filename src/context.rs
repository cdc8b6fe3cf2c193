/// Application context and dependency injection
use crate::{
    api::ManagementClient,
    config::SyncConfig,
    error::SyncResult,
    identity::{BatchResolver, HttpIdentityProvider, IdentityCache, IdentityResolverConfig},
    retry::RetryPolicy,
};
use std::sync::Arc;
use tracing::debug;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<SyncConfig>,
    pub client: ManagementClient,
    pub cache: Arc<IdentityCache>,
    pub resolver: Arc<BatchResolver>,
    /// Policy for team applies
    pub apply_policy: RetryPolicy,
    /// Policy for connectivity probes
    pub probe_policy: RetryPolicy,
}

impl AppContext {
    /// Create a new application context from configuration
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        // Validate configuration
        config.validate()?;

        let client = ManagementClient::new(&config.api_client_config())?;

        // The cache lives exactly as long as this context
        let cache = Arc::new(IdentityCache::new(config.cache_ttl()));

        let provider = Arc::new(HttpIdentityProvider::new(client.clone()));
        let resolver = Arc::new(BatchResolver::new(
            provider,
            Arc::clone(&cache),
            IdentityResolverConfig {
                concurrency: config.resolver.concurrency,
                policy: config.retry_policy(),
            },
        ));

        debug!(
            base_url = client.base_url(),
            concurrency = config.resolver.concurrency,
            cache_ttl_secs = config.resolver.cache_ttl_secs,
            "Application context ready"
        );

        Ok(Self {
            apply_policy: config.retry_policy(),
            probe_policy: RetryPolicy::network(),
            config: Arc::new(config),
            client,
            cache,
            resolver,
        })
    }
}
