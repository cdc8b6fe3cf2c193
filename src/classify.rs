//! Error classification shared by the retry executor and the resolver.
//!
//! Tagged errors answer for themselves through [`SyncError::kind`]. Errors from
//! opaque collaborators carry only a message, so they are matched against two
//! disjoint pattern sets: "not found" (stable, cacheable) and "retryable"
//! (transient, never cached).

use crate::error::{ErrorKind, SyncError};

/// Substrings marking a stable negative lookup
pub const NOT_FOUND_PATTERNS: &[&str] = &[
    "not found",
    "404",
    "no such user",
    "does not exist",
    "unknown user",
];

/// Substrings marking a transient failure
pub const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection refused",
    "connection reset",
    "network error",
    "rate limit",
    "too many requests",
    "temporarily unavailable",
    "service unavailable",
    "bad gateway",
    "internal server error",
    "429",
    "500",
    "502",
    "503",
    "504",
];

/// Classify an error against the default retryable set
pub fn classify(err: &SyncError) -> ErrorKind {
    classify_with(err, RETRYABLE_PATTERNS)
}

/// Classify an error against a caller-supplied retryable set. Tagged errors
/// keep their kind; opaque ones go through [`classify_message_with`].
pub fn classify_with<S: AsRef<str>>(err: &SyncError, retryable: &[S]) -> ErrorKind {
    match err.kind() {
        ErrorKind::Unclassified => classify_message_with(&err.to_string(), retryable),
        kind => kind,
    }
}

/// Classify a bare error message against the default retryable set
pub fn classify_message(message: &str) -> ErrorKind {
    classify_message_with(message, RETRYABLE_PATTERNS)
}

/// Not-found patterns win over any retryable pattern
pub fn classify_message_with<S: AsRef<str>>(message: &str, retryable: &[S]) -> ErrorKind {
    let lowered = message.to_lowercase();
    if matches_any(&lowered, NOT_FOUND_PATTERNS) {
        ErrorKind::NotFound
    } else if matches_any(&lowered, retryable) {
        ErrorKind::Transient
    } else {
        ErrorKind::Permanent
    }
}

/// Case-insensitive substring match; `haystack` must already be lowercase
pub(crate) fn matches_any<S: AsRef<str>>(haystack: &str, patterns: &[S]) -> bool {
    patterns
        .iter()
        .any(|p| !p.as_ref().is_empty() && haystack.contains(&p.as_ref().to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_errors_keep_their_kind() {
        // the message mentions a timeout, but the tag is authoritative
        let err = SyncError::NotFound("lookup timeout for bob".into());
        assert_eq!(classify(&err), ErrorKind::NotFound);

        let err = SyncError::Validation("503 is not a valid id".into());
        assert_eq!(classify(&err), ErrorKind::Permanent);
    }

    #[test]
    fn test_opaque_messages() {
        assert_eq!(
            classify(&SyncError::Remote("User Not Found".into())),
            ErrorKind::NotFound
        );
        assert_eq!(
            classify(&SyncError::Remote("Connection Refused (os error 111)".into())),
            ErrorKind::Transient
        );
        assert_eq!(
            classify(&SyncError::Internal("HTTP 503 from upstream".into())),
            ErrorKind::Transient
        );
        assert_eq!(
            classify(&SyncError::Remote("authentication failed".into())),
            ErrorKind::Permanent
        );
    }

    #[test]
    fn test_not_found_wins_over_retryable() {
        assert_eq!(
            classify_message("user 5001 not found"),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_custom_retryable_set_keeps_not_found_precedence() {
        let err = SyncError::Remote("user 5001 not found".into());
        assert_eq!(classify_with(&err, &["500"]), ErrorKind::NotFound);

        let err = SyncError::Remote("HTTP 500 from upstream".into());
        assert_eq!(classify_with(&err, &["timeout"]), ErrorKind::Permanent);
        assert_eq!(classify_with(&err, &["500"]), ErrorKind::Transient);
    }

    #[test]
    fn test_pattern_sets_are_disjoint() {
        for p in NOT_FOUND_PATTERNS {
            assert!(!RETRYABLE_PATTERNS.contains(p), "{} in both sets", p);
        }
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        assert!(!matches_any("anything", &[""]));
        assert!(matches_any("connection timeout", &["TIMEOUT"]));
    }
}
