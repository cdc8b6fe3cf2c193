/// Configuration management for roster-sync
use crate::{
    api::ApiClientConfig,
    error::{SyncError, SyncResult},
    identity::resolver::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY},
    retry::RetryPolicy,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub api: ApiConfig,
    pub resolver: ResolverConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Remote management API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// Identity resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Admission gate capacity
    pub concurrency: usize,
    /// Lifetime of cached resolutions
    pub cache_ttl_secs: u64,
}

/// Overrides applied on top of the remote API retry preset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Metrics configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus textfile written at the end of a run
    pub textfile: Option<PathBuf>,
}

impl SyncConfig {
    /// Load configuration from environment variables (and `.env`)
    pub fn from_env() -> SyncResult<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = var("ROSTER_API_URL")
            .ok_or_else(|| SyncError::Config("ROSTER_API_URL is required".to_string()))?;
        let token = var("ROSTER_API_TOKEN");
        let timeout_secs = parse_or(var("ROSTER_API_TIMEOUT_SECS"), "ROSTER_API_TIMEOUT_SECS", 30)?;
        let user_agent = var("ROSTER_USER_AGENT")
            .unwrap_or_else(|| format!("roster-sync/{}", env!("CARGO_PKG_VERSION")));

        let concurrency = parse_or(
            var("ROSTER_RESOLVER_CONCURRENCY"),
            "ROSTER_RESOLVER_CONCURRENCY",
            DEFAULT_CONCURRENCY,
        )?;
        let cache_ttl_secs = parse_or(var("ROSTER_CACHE_TTL_SECS"), "ROSTER_CACHE_TTL_SECS", 3600)?;

        let retry = RetryConfig {
            max_attempts: parse_opt(var("ROSTER_RETRY_MAX_ATTEMPTS"), "ROSTER_RETRY_MAX_ATTEMPTS")?,
            initial_delay_ms: parse_opt(
                var("ROSTER_RETRY_INITIAL_DELAY_MS"),
                "ROSTER_RETRY_INITIAL_DELAY_MS",
            )?,
            max_delay_ms: parse_opt(var("ROSTER_RETRY_MAX_DELAY_MS"), "ROSTER_RETRY_MAX_DELAY_MS")?,
        };

        let level = var("RUST_LOG").unwrap_or_else(|| "roster_sync=info".to_string());
        let format = match var("ROSTER_LOG_FORMAT").as_deref().map(str::to_lowercase) {
            None => LogFormat::Text,
            Some(f) if f == "text" => LogFormat::Text,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => {
                return Err(SyncError::Config(format!(
                    "ROSTER_LOG_FORMAT must be 'text' or 'json' (got '{}')",
                    other
                )))
            }
        };

        let textfile = var("ROSTER_METRICS_FILE").map(PathBuf::from);

        Ok(SyncConfig {
            api: ApiConfig {
                base_url,
                token,
                timeout_secs,
                user_agent,
            },
            resolver: ResolverConfig {
                concurrency,
                cache_ttl_secs,
            },
            retry,
            logging: LoggingConfig { level, format },
            metrics: MetricsConfig { textfile },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> SyncResult<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SyncError::Config(format!(
                "API URL must start with http:// or https:// (got '{}')",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(SyncError::Config("API timeout must be positive".to_string()));
        }

        if self.resolver.concurrency == 0 || self.resolver.concurrency > MAX_CONCURRENCY {
            return Err(SyncError::Config(format!(
                "Resolver concurrency must be between 1 and {} (got {})",
                MAX_CONCURRENCY, self.resolver.concurrency
            )));
        }

        self.retry_policy().validate()?;

        Ok(())
    }

    /// Remote API preset with configured overrides applied
    pub fn retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::remote_api();
        if let Some(attempts) = self.retry.max_attempts {
            policy.max_attempts = attempts;
        }
        if let Some(ms) = self.retry.initial_delay_ms {
            policy.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry.max_delay_ms {
            policy.max_delay = Duration::from_millis(ms);
        }
        policy
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.resolver.cache_ttl_secs)
    }

    pub fn api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: self.api.base_url.trim().to_string(),
            token: self.api.token.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs),
            user_agent: self.api.user_agent.clone(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> SyncResult<T> {
    Ok(parse_opt(value, key)?.unwrap_or(default))
}

fn parse_opt<T: std::str::FromStr>(value: Option<String>, key: &str) -> SyncResult<Option<T>> {
    value
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| SyncError::Config(format!("Invalid value for {}: '{}'", key, v)))
        })
        .transpose()
}
