/// Retry policy - backoff, jitter, and retryable-pattern configuration
use crate::{
    classify::{self, RETRYABLE_PATTERNS},
    error::{ErrorKind, SyncError, SyncResult},
};
use rand::Rng;
use std::time::Duration;

const NETWORK_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "network error",
    "dns error",
];

const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit", "too many requests", "429"];

/// Immutable retry configuration shared by any number of operations
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single computed delay
    pub max_delay: Duration,
    /// Exponential growth factor (> 1.0)
    pub backoff_factor: f64,
    /// Symmetric jitter as a fraction of the delay (0.0..=1.0)
    pub jitter_factor: f64,
    /// Case-insensitive substrings marking an opaque error as retryable
    pub retryable_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::remote_api()
    }
}

impl RetryPolicy {
    /// Preset for calls against the remote management API
    pub fn remote_api() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            jitter_factor: 0.1,
            retryable_patterns: to_owned(RETRYABLE_PATTERNS),
        }
    }

    /// Preset for plain connectivity: quick first retry, gives up sooner
    pub fn network() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter_factor: 0.1,
            retryable_patterns: to_owned(NETWORK_PATTERNS),
        }
    }

    /// Preset for throttled endpoints
    pub fn rate_limit() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter_factor: 0.2,
            retryable_patterns: to_owned(RATE_LIMIT_PATTERNS),
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> SyncResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "remote_api" | "remote-api" | "api" => Ok(Self::remote_api()),
            "network" => Ok(Self::network()),
            "rate_limit" | "rate-limit" => Ok(Self::rate_limit()),
            other => Err(SyncError::Config(format!("Unknown retry preset: {}", other))),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delays(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn with_jitter(mut self, jitter_factor: f64) -> Self {
        self.jitter_factor = jitter_factor;
        self
    }

    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Validate numeric invariants
    pub fn validate(&self) -> SyncResult<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config(
                "Retry max_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.backoff_factor > 1.0) || !self.backoff_factor.is_finite() {
            return Err(SyncError::Config(format!(
                "Retry backoff_factor must be greater than 1.0 (got {})",
                self.backoff_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(SyncError::Config(format!(
                "Retry jitter_factor must be within 0.0..=1.0 (got {})",
                self.jitter_factor
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(SyncError::Config(
                "Retry initial_delay cannot exceed max_delay".to_string(),
            ));
        }
        Ok(())
    }

    /// Deterministic delay to wait after failed `attempt` (1-based):
    /// `min(initial_delay * backoff_factor^(attempt-1), max_delay)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped > 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            Duration::ZERO
        }
    }

    /// Delay with symmetric jitter applied, clamped at zero
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        self.jittered_delay_with(attempt, &mut rand::thread_rng())
    }

    pub fn jittered_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.delay_for_attempt(attempt);
        let spread = base.as_secs_f64() * self.jitter_factor;
        if spread <= 0.0 {
            return base;
        }
        let jittered = base.as_secs_f64() + rng.gen_range(-spread..=spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Classify `err` with this policy's retryable set. Tagged kinds are kept,
    /// and opaque not-found messages stay not-found whatever the patterns say.
    pub fn classify(&self, err: &SyncError) -> ErrorKind {
        classify::classify_with(err, &self.retryable_patterns)
    }

    /// Retry decision; only transient failures are retried
    pub fn is_retryable(&self, err: &SyncError) -> bool {
        self.classify(err) == ErrorKind::Transient
    }
}

fn to_owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deterministic() -> RetryPolicy {
        RetryPolicy::remote_api()
            .with_delays(Duration::from_secs(1), Duration::from_secs(10))
            .with_backoff_factor(2.0)
            .with_jitter(0.0)
    }

    #[test]
    fn test_exponential_delays() {
        let policy = deterministic();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(10));
        // jitter 0 means the jittered path is exact too
        assert_eq!(policy.jittered_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn test_huge_attempt_is_capped() {
        let policy = deterministic();
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = deterministic().with_jitter(0.1);
        let base = policy.delay_for_attempt(2).as_secs_f64();

        let samples: Vec<f64> = (0..200)
            .map(|_| policy.jittered_delay(2).as_secs_f64())
            .collect();

        for s in &samples {
            assert!(*s >= base * 0.9 - 1e-9 && *s <= base * 1.1 + 1e-9, "{} out of range", s);
        }
        let first = samples[0];
        assert!(samples.iter().any(|s| (s - first).abs() > f64::EPSILON));
    }

    #[test]
    fn test_full_jitter_never_negative() {
        let policy = deterministic().with_jitter(1.0);
        for _ in 0..100 {
            let d = policy.jittered_delay(1);
            assert!(d <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::remote_api().validate().is_ok());
        assert!(RetryPolicy::network().validate().is_ok());
        assert!(RetryPolicy::rate_limit().validate().is_ok());

        assert!(deterministic().with_max_attempts(0).validate().is_err());
        assert!(deterministic().with_backoff_factor(1.0).validate().is_err());
        assert!(deterministic().with_backoff_factor(f64::NAN).validate().is_err());
        assert!(deterministic().with_jitter(1.5).validate().is_err());
        assert!(deterministic()
            .with_delays(Duration::from_secs(5), Duration::from_secs(1))
            .validate()
            .is_err());
    }

    #[test]
    fn test_presets_by_name() {
        assert_eq!(RetryPolicy::preset("Network").unwrap(), RetryPolicy::network());
        assert_eq!(
            RetryPolicy::preset("rate-limit").unwrap(),
            RetryPolicy::rate_limit()
        );
        assert!(RetryPolicy::preset("aggressive").is_err());
    }

    #[test]
    fn test_network_preset_is_shorter() {
        let api = RetryPolicy::remote_api();
        let net = RetryPolicy::network();
        let rl = RetryPolicy::rate_limit();
        assert!(net.initial_delay < api.initial_delay);
        assert!(net.max_attempts < api.max_attempts);
        assert!(rl.initial_delay > api.initial_delay);
    }

    #[test]
    fn test_retry_decision() {
        let policy = deterministic().with_patterns(["timeout"]);

        assert!(policy.is_retryable(&SyncError::Remote("connection timeout".into())));
        assert!(!policy.is_retryable(&SyncError::Remote("authentication failed".into())));
        // tagged transient errors do not need a pattern
        assert!(policy.is_retryable(&SyncError::Transient("reset".into())));
        assert!(!policy.is_retryable(&SyncError::NotFound("timeout".into())));
        assert!(!policy.is_retryable(&SyncError::Cancelled));
    }

    #[test]
    fn test_opaque_not_found_is_never_retried() {
        let err = SyncError::Remote("user 5001 not found".into());
        for policy in [
            RetryPolicy::remote_api(),
            RetryPolicy::network(),
            RetryPolicy::rate_limit(),
            deterministic().with_patterns(["500", "not found"]),
        ] {
            assert_eq!(policy.classify(&err), ErrorKind::NotFound);
            assert!(!policy.is_retryable(&err));
        }
    }

    #[test]
    fn test_classification_follows_policy_patterns() {
        let err = SyncError::Remote("HTTP 500 from upstream".into());
        assert_eq!(RetryPolicy::remote_api().classify(&err), ErrorKind::Transient);
        assert_eq!(RetryPolicy::network().classify(&err), ErrorKind::Permanent);
        assert!(!RetryPolicy::network().is_retryable(&err));
    }
}
